//! OpenShift client from the stable channel of the client mirror.

use backplane_core::{AssetSelector, Executable, ManifestFormat, PlatformMatch, ToolSpec, Verification};
use backplane_source_mirror::MirrorSource;
use std::sync::Arc;

use crate::CatalogConfig;

const SLUG: &str = "/pub/openshift-v4/{arch}/clients/ocp/stable/";
const CLIENT_ARCHIVE: &str = "openshift-client-{mirror_os}-{version}.tar.gz";
const MANIFEST: &str = "sha256sum.txt";

pub fn oc(config: &CatalogConfig) -> ToolSpec {
    let source = MirrorSource::new(
        config.http.clone(),
        config.mirror_base_url.clone(),
        SLUG,
        [CLIENT_ARCHIVE, MANIFEST],
    )
    .with_platform(config.platform);

    ToolSpec::new("oc", Arc::new(source))
        .with_primary(
            AssetSelector::for_platform()
                .with_platform(PlatformMatch::None)
                .containing(["openshift-client-"]),
        )
        .with_verification(Verification::SharedManifest {
            selector: AssetSelector::exact(MANIFEST),
            format: ManifestFormat::DigestThenName,
        })
        .with_executable(Executable::Path("oc".into()))
}

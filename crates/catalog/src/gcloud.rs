//! Google Cloud CLI, published as tarballs in a public bucket.

use backplane_core::{AssetSelector, Executable, PlatformMatch, ToolSpec};
use backplane_source_gcs::BucketSource;
use std::sync::Arc;

use crate::CatalogConfig;

const BUCKET: &str = "cloud-sdk-release";
const PREFIX: &str = "google-cloud-cli";

pub fn gcloud(config: &CatalogConfig) -> ToolSpec {
    let source = BucketSource::new(config.http.clone(), BUCKET, PREFIX).with_platform(config.platform);
    // the bucket source already resolved the platform object
    ToolSpec::new("gcloud", Arc::new(source))
        .with_primary(AssetSelector::for_platform().with_platform(PlatformMatch::None))
        .with_executable(Executable::Path("google-cloud-sdk/bin/gcloud".into()))
}

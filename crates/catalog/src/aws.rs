//! AWS CLI v2.
//!
//! Versions come from the aws-cli repository tags while the bundles are
//! served from awscli.amazonaws.com: a versioned zip on Linux, the current
//! installer package on macOS.

use backplane_core::{AssetSelector, Executable, Os, PlatformMatch, ToolSpec};
use backplane_source_github::{GitHubSource, TaggedUrlSource};
use std::sync::Arc;

use crate::CatalogConfig;

const LINUX_BUNDLE: &str = "https://awscli.amazonaws.com/awscli-exe-linux-{uname_arch}-{version}.zip";

const MAC_PACKAGE: &str = "https://awscli.amazonaws.com/AWSCLIV2.pkg";

const LINUX_DIST_DIR: &str = "aws-cli/aws/dist";

/// Where `pkgutil --expand-full` leaves the binaries.
const MAC_DIST_DIR: &str = "aws-cli/aws-cli.pkg/Payload/aws-cli";

const WRAPPER: &str = r#"#!/usr/bin/env bash
set \
  -o nounset \
  -o pipefail \
  -o errexit

export HTTPS_PROXY={proxy}
export HTTP_PROXY={proxy}

if ! command -v curl &> /dev/null
then
  echo "WARN: curl is not installed, cannot preflight VPN connection. If this command seems to hang you might need to connect to the VPN" 1>&2
else
  # fail fast instead of waiting on the proxy timeout
  if ! curl --connect-timeout 1 {proxy_host} > /dev/null 2>&1
  then
    echo "BPTools Error: Proxy Unavailable. Are you on the VPN?" 1>&2
    exit 5
  fi
fi

exec {exec} "$@"
"#;

/// Launcher routing every aws call through `proxy`.
pub fn wrapper_script(proxy: &str) -> String {
    let host = proxy.split(':').next().unwrap_or(proxy);
    WRAPPER.replace("{proxy_host}", host).replace("{proxy}", proxy)
}

pub fn aws(config: &CatalogConfig) -> ToolSpec {
    let (template, dist_dir) = match config.platform.os {
        Os::Linux => (LINUX_BUNDLE, LINUX_DIST_DIR),
        Os::Darwin => (MAC_PACKAGE, MAC_DIST_DIR),
    };
    let tags = GitHubSource::new("aws", "aws-cli", config.http.clone()).with_token(config.github_token.clone());
    let source = TaggedUrlSource::new(tags, vec![template]).with_platform(config.platform);

    ToolSpec::new("aws", Arc::new(source))
        .with_primary(AssetSelector::for_platform().with_platform(PlatformMatch::None))
        .with_unpack_into("aws-cli")
        .with_executable(Executable::Path(format!("{dist_dir}/aws")))
        .with_wrapper("aws", wrapper_script(&config.aws_proxy))
        .with_extra_link("aws_completer", format!("{dist_dir}/aws_completer"))
}

use clap::Parser;
use ocisave::{config::PlatformRequest, PullConfig};
use std::{path::PathBuf, str::FromStr};

#[derive(Debug, Parser)]
#[clap(version)]
enum Opt {
    /// Pull an image and save it locally in the target format
    Pull {
        /// Image reference, e.g. `ghcr.io/owner/app:v1`
        image: String,

        /// Path to save the image as a tar file, or directory for layout
        #[clap(long, parse(from_os_str))]
        path: PathBuf,

        /// Format to save the image, one of 'v1-layout', 'v1-tarball', 'legacy-tarball'
        #[clap(long, default_value = "v1-layout")]
        format: String,

        /// Show additional detail for manifests, such as hash and size
        #[clap(long)]
        detail: bool,

        /// Platform to select out of a multi-platform index, e.g. 'linux/amd64'
        #[clap(long)]
        platform: Option<String>,

        /// Tag recorded in tarballs when the image is addressed by digest
        #[clap(long, default_value = "i-was-a-digest")]
        digest_tag: String,
    },
}

fn main() -> ocisave::error::Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    match Opt::parse() {
        Opt::Pull {
            image,
            path,
            format,
            detail,
            platform,
            digest_tag,
        } => {
            let platform = platform
                .as_deref()
                .map(PlatformRequest::from_str)
                .transpose()?;
            let config = PullConfig {
                digest_tag,
                platform,
                detail,
            };
            ocisave::pull(&image, &format, &path, &config)?;
            log::info!("saved {} to {}", image, path.display());
        }
    }
    Ok(())
}

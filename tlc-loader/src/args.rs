use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Project the bucket is created in (GCS only).
    #[arg(long, default_value = "smooth-ace-486714-u3")]
    pub project_id: String,

    /// Destination bucket.
    #[arg(short, long, default_value = "nyc-taxi-data-zoomcamp-2026")]
    pub bucket: String,

    /// JSON file holding `access_key_id` and `secret_access_key`.
    #[arg(short, long, default_value = "../secrets/service-account.json")]
    pub credentials: PathBuf,

    /// Scratch directory for downloaded and decompressed files.
    #[arg(short, long, default_value = "/tmp/nyc-taxi")]
    pub staging_dir: PathBuf,

    /// Datasets to load.
    #[arg(short, long, value_delimiter = ',', default_value = "yellow,green")]
    pub datasets: Vec<String>,

    /// Years to load.
    #[arg(short, long, value_delimiter = ',', default_value = "2019,2020")]
    pub years: Vec<u16>,

    /// Months to load.
    #[arg(
        short,
        long,
        value_delimiter = ',',
        default_value = "1,2,3,4,5,6,7,8,9,10,11,12"
    )]
    pub months: Vec<u8>,

    /// Number of files transferred at once.
    #[arg(short, long, default_value = "6")]
    pub pool_size: usize,

    /// Where the compressed monthly files are published.
    #[arg(
        long,
        default_value = "https://github.com/DataTalksClub/nyc-tlc-data/releases/download"
    )]
    pub base_url: String,

    /// Object store url.
    #[arg(short, long, default_value = "https://storage.googleapis.com")]
    pub endpoint: String,

    /// Object store region.
    #[arg(short, long, default_value = "auto")]
    pub region: String,

    /// Location new buckets are created in.
    #[arg(short, long, default_value = "US")]
    pub location: String,
}

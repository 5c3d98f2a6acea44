use camino::Utf8PathBuf;

#[derive(clap::Parser)]
pub(crate) struct Cli {
    /// Path to the configuration file
    #[clap(long, default_value = "mpdgate.yaml")]
    pub(crate) config: Utf8PathBuf,

    #[clap(subcommand)]
    pub(crate) command: Commands,
}

#[derive(clap::Subcommand)]
pub(crate) enum Commands {
    /// Serve the mpd protocol
    Run,
    /// Scan the music directory into the library database and exit
    Scan,
}

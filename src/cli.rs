use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "casita-evidence",
    about = "Compress, upload and track photo evidence for casita inspections",
    long_about = "casita-evidence prepares inspection photos for the web: it resizes and re-encodes \
                  them, uploads them to Cloudinary or ImageKit, stores the resulting URLs on the \
                  inspection record in Supabase and can resume uploads interrupted by a crash.",
    version,
    after_help = "EXAMPLES:\n  \
    casita-evidence compress fachada.jpg ./out -w 1200 -q 80\n  \
    casita-evidence upload ./fotos --record 42 --field evidencia_fachada -r\n  \
    casita-evidence resume --yes\n  \
    casita-evidence optimize-url https://res.cloudinary.com/demo/image/upload/v1/casa.jpg\n  \
    casita-evidence serve --port 3000"
)]
pub struct Args {
    #[arg(short = 'Q', long, global = true, help = "Suppress console output")]
    pub quiet: bool,

    #[arg(short = 'v', long, global = true, help = "Show debug diagnostics")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        help = "Directory for the local store (default: .casita)",
        long_help = "Directory holding store.json with the login session and upload sessions. \
                     Overrides CASITA_DATA_DIR."
    )]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    Cloudinary,
    Imagekit,
    /// ImageKit through a running `serve` instance
    Proxy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UrlProvider {
    Cloudinary,
    Imagekit,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(
        about = "Compress images into a directory",
        long_about = "Resize images wider than the maximum width and re-encode them. \
                      Input can be a file, a directory or a glob pattern."
    )]
    Compress {
        #[arg(help = "Input file, directory, or glob")]
        input: String,

        #[arg(help = "Output directory path")]
        output: PathBuf,

        #[arg(short = 'w', long, help = "Maximum width in pixels (default: 1200)")]
        width: Option<u32>,

        #[arg(
            short = 'q',
            long,
            help = "Encoder quality (1-100, default: 80)",
            long_help = "Encoder quality from 1 (lowest) to 100 (highest). \
                         Applies to both WebP and JPEG output."
        )]
        quality: Option<u8>,

        #[arg(short = 'f', long, help = "Output format (webp, jpeg)")]
        format: Option<String>,

        #[arg(short = 'r', long, help = "Process subdirectories recursively")]
        recursive: bool,
    },

    #[command(
        about = "Compress and upload evidence for an inspection record",
        long_about = "Compress every input image and upload it to the selected CDN, one at a time. \
                      The upload is tracked as a session in the local store so it can be resumed. \
                      When Supabase is configured the URL is written to the record's evidence column."
    )]
    Upload {
        #[arg(help = "Input file, directory, or glob")]
        input: String,

        #[arg(long, help = "Inspection record id")]
        record: String,

        #[arg(long, help = "Evidence column, e.g. evidencia_fachada")]
        field: String,

        #[arg(long, value_enum, default_value = "cloudinary", help = "Image CDN")]
        provider: Provider,

        #[arg(
            long,
            help = "Base URL of the upload proxy (default: http://localhost:3000)",
            long_help = "Base URL of a running `casita-evidence serve` instance. \
                         Only used with --provider proxy."
        )]
        proxy_url: Option<String>,

        #[arg(long, help = "Asset name instead of the generated one")]
        custom_name: Option<String>,

        #[arg(short = 'r', long, help = "Process subdirectories recursively")]
        recursive: bool,

        #[arg(short = 'w', long, help = "Maximum width in pixels (default: 1200)")]
        width: Option<u32>,

        #[arg(short = 'q', long, help = "Encoder quality (1-100, default: 80)")]
        quality: Option<u8>,
    },

    #[command(
        about = "Resume uploads interrupted in an earlier run",
        long_about = "Lists upload sessions that did not finish and replays them through the \
                      background queue worker. Sessions older than 24 hours are discarded."
    )]
    Resume {
        #[arg(long, help = "Resume without asking")]
        yes: bool,

        #[arg(long, conflicts_with = "yes", help = "Discard pending sessions instead")]
        dismiss: bool,

        #[arg(long, value_enum, default_value = "cloudinary", help = "Image CDN")]
        provider: Provider,

        #[arg(long, help = "Base URL of the upload proxy")]
        proxy_url: Option<String>,
    },

    #[command(
        name = "optimize-url",
        about = "Rewrite a CDN URL with delivery transformations",
        long_about = "Cloudinary URLs get f_auto,q_auto (or a fill thumbnail with --width/--height). \
                      ImageKit URLs get a tr:w-,h- transformation after the URL endpoint."
    )]
    OptimizeUrl {
        #[arg(help = "Image URL")]
        url: String,

        #[arg(long, value_enum, default_value = "cloudinary", help = "URL provider")]
        provider: UrlProvider,

        #[arg(long, help = "Target width in pixels")]
        width: Option<u32>,

        #[arg(long, help = "Target height in pixels")]
        height: Option<u32>,

        #[arg(long, help = "ImageKit URL endpoint (default: IMAGEKIT_URL_ENDPOINT)")]
        endpoint: Option<String>,

        #[arg(long, help = "Strip the Cloudinary auto transformation instead")]
        original: bool,
    },

    #[command(about = "Show an inspection record and its evidence URLs")]
    Revision {
        #[arg(help = "Record id")]
        id: i64,

        #[arg(long, help = "Print the raw JSON row")]
        json: bool,
    },

    #[command(about = "Log in against the users table")]
    Login {
        #[arg(help = "Username")]
        username: String,

        #[arg(long, help = "Password (read from stdin when omitted)")]
        password: Option<String>,
    },

    #[command(about = "Forget the stored login session")]
    Logout,

    #[command(about = "Show the logged-in user")]
    Whoami,

    #[command(
        about = "Run the HTTP service",
        long_about = "Serves the ImageKit upload proxy, the storage setup route and record lookup."
    )]
    Serve {
        #[arg(long, help = "Listen host (default: SERVER_HOST or 0.0.0.0)")]
        host: Option<String>,

        #[arg(short = 'p', long, help = "Listen port (default: SERVER_PORT or 3000)")]
        port: Option<u16>,
    },
}

use std::path::Path;

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "pdf-reflow-translator",
    version,
    about = "Translate a PDF page by page while keeping its layout"
)]
struct Cli {
    /// PDF file to translate
    input: Option<String>,

    /// Output PDF (default: <input>.translated.pdf)
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Source language
    #[arg(long = "from", default_value = "English")]
    from_lang: String,

    /// Target language
    #[arg(long = "to", default_value = "Slovenian")]
    to_lang: String,

    /// First page to translate (zero-based)
    #[arg(long = "from-page", default_value_t = 0)]
    from_page: usize,

    /// Last page to translate (zero-based, inclusive; 0 = last page)
    #[arg(long = "to-page", default_value_t = 0)]
    to_page: usize,

    /// Place each original page next to its translation
    #[arg(long = "side-by-side")]
    side_by_side: bool,

    /// Also write <output>.regions.json describing every region
    #[arg(long = "report")]
    report: bool,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Show the translator's languages and exit
    #[arg(long = "show-languages")]
    show_languages: bool,

    /// Serve the HTTP API on ADDR instead (e.g. 0.0.0.0:8765)
    #[arg(long = "server")]
    server: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    pdf_reflow_translator::logging::init(cli.verbose)?;

    if let Some(addr) = cli.server {
        let settings =
            pdf_reflow_translator::settings::load_settings(cli.read_settings.as_deref().map(Path::new))?;
        let pipeline = pdf_reflow_translator::build_pipeline(&settings)?;
        return pdf_reflow_translator::server::run_server(pipeline, addr).await;
    }

    let config = pdf_reflow_translator::Config {
        input: cli.input,
        output: cli.output,
        from_lang: cli.from_lang,
        to_lang: cli.to_lang,
        from_page: cli.from_page,
        to_page: cli.to_page,
        side_by_side: cli.side_by_side,
        report: cli.report,
        settings_path: cli.read_settings,
        show_languages: cli.show_languages,
    };
    let output = pdf_reflow_translator::run(config).await?;
    println!("{}", output);
    Ok(())
}

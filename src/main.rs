//! # Pagenote CLI
//!
//! Usage:
//!   pagenote document.json
//!   pagenote document.json --config engine.json --json
//!   echo '{ ... }' | pagenote
//!   pagenote --example > document.json
//!
//! Layout uses the fixed-advance geometry provider, so page breaks are
//! those of a monospace rendition of the document.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::info;

use pagenote::geometry::monospace::MonospaceGeometry;
use pagenote::{EngineConfig, LayoutInfo, PagenoteError};

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "pagenote", version, about = "Paginate a document with footnotes")]
struct Args {
    /// Saved document (JSON). Read from stdin when omitted.
    path: Option<PathBuf>,
    /// Engine configuration (JSON); every field is optional.
    #[arg(long = "config")]
    config: Option<PathBuf>,
    /// Print the layout as JSON instead of a summary.
    #[arg(long)]
    json: bool,
    /// Print a sample document and exit.
    #[arg(long)]
    example: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    if args.example {
        print!("{}", example_document_json());
        return ExitCode::SUCCESS;
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("✗ {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), PagenoteError> {
    let input = match &args.path {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let layout = pagenote::paginate_json(&input, config, &MonospaceGeometry::default())?;
    info!("laid out {} pages", layout.pages.len());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&layout)?);
    } else {
        print_summary(&layout);
    }
    Ok(())
}

fn print_summary(layout: &LayoutInfo) {
    for page in &layout.pages {
        println!(
            "── Page {} ── {} fragments, footer {:.1}pt",
            page.index + 1,
            page.fragments.len(),
            page.footer.height
        );
        for fragment in &page.fragments {
            println!("  {}", fragment.text);
        }
        if !page.footer.items.is_empty() {
            println!("  ────");
            for item in &page.footer.items {
                println!("  {}. {}", item.number, item.content);
            }
        }
    }
}

fn example_document_json() -> &'static str {
    r##"{
  "title": "On Marginalia",
  "lang": "en",
  "content": [
    { "tag": "H1", "content": "On Marginalia" },
    {
      "tag": "P",
      "content": [
        "Readers have always written in the margins of their books",
        {
          "tag": "SUP",
          "content": "1",
          "footnote": {
            "content": "The oldest surviving annotations are found on papyrus scrolls.",
            "extra": { "sourceLang": "en", "targetLang": "de" }
          }
        },
        ". Some notes correct the text, others argue with it, and a few ",
        { "tag": "SPAN", "style": { "fontStyle": "italic" }, "content": "simply record that the reader was there" },
        "."
      ]
    },
    {
      "tag": "P",
      "content": [
        "Printed footnotes formalised the habit",
        {
          "tag": "SUP",
          "content": "2",
          "footnote": { "content": "See the discussion of scholia in the second chapter." }
        },
        ", moving the reader's voice into the author's page."
      ]
    },
    {
      "tag": "UL",
      "content": [
        { "tag": "LI", "content": "Glosses between the lines" },
        { "tag": "LI", "content": "Scholia in the margin" },
        { "tag": "LI", "content": "Notes at the foot of the page" }
      ]
    }
  ]
}
"##
}

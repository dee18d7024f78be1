use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use structopt::StructOpt;

use mcc::emitter::TextSink;
use mcc::lexer::Lexer;
use mcc::{compile, CompileOptions};

fn main() {
    let opts = Opt::from_args();
    if let Err(e) = run(&opts) {
        eprintln!("mcc: {:#}", e);
        std::process::exit(1);
    }
}

fn run(opts: &Opt) -> Result<()> {
    let src = std::fs::read_to_string(&opts.path)
        .with_context(|| format!("cannot read {}", opts.path.display()))?;

    if opts.lex {
        for token in Lexer::new(src.as_str()) {
            println!("{:?}", token?);
        }
        std::process::exit(0);
    }

    let out = File::create(&opts.output)
        .with_context(|| format!("cannot create {}", opts.output.display()))?;

    let options = CompileOptions { dump_ast: opts.ast };
    compile(&src, TextSink::new(BufWriter::new(out)), &options)?;

    if let Some(ref exe) = opts.link {
        let status = std::process::Command::new("gcc")
            .arg("-o")
            .arg(exe)
            .arg(&opts.output)
            .status()
            .context("cannot run gcc")?;
        ensure!(status.success(), "gcc failed with {}", status);
    }

    Ok(())
}

#[derive(Debug, StructOpt)]
struct Opt {
    path: PathBuf,

    #[structopt(short, long, default_value = "out.s")]
    output: PathBuf,

    #[structopt(name = "lex", long)]
    lex: bool,

    #[structopt(name = "ast", long)]
    ast: bool,

    #[structopt(long)]
    link: Option<PathBuf>,
}

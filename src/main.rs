use std::fs;

use anyhow::{bail, Context, Result};

use mython::runtime::StringContext;
use mython::{interpreter, lexer, parser};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        bail!("Usage: mython <in_file> <out_file>");
    }
    let in_path = &args[1];
    let out_path = &args[2];

    let source = fs::read_to_string(in_path).with_context(|| format!("Reading {in_path}"))?;

    let tokens = lexer::tokenize(&source)?;
    let program = parser::parse_tokens(tokens)?;

    let mut context = StringContext::new();
    interpreter::run_program(&program, &mut context)?;

    fs::write(out_path, context.output_str()).with_context(|| format!("Writing {out_path}"))?;
    Ok(())
}

pub mod emitter;
pub mod error;
pub mod lexer;
pub mod symtab;
pub mod types;
pub mod parser {
    pub mod ast;
    pub mod recursive_descent;
}
pub mod codegen {
    pub mod asm;
    pub mod gen;
    pub mod regalloc;
}

use anyhow::Result;

use codegen::gen::CodeGen;
use emitter::{AsmSink, TextSink};
use lexer::Lexer;
use parser::recursive_descent::Parser;

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub dump_ast: bool,
}

pub fn compile<S: AsmSink>(src: &str, sink: S, options: &CompileOptions) -> Result<S> {
    let mut codegen = CodeGen::new(sink)?;
    codegen.gen_preamble()?;

    let mut parser = Parser::new(Lexer::new(src), codegen).dump_ast(options.dump_ast);
    parser.parse_decls()?;

    let mut codegen = parser.into_codegen();
    codegen.gen_postamble()?;

    Ok(codegen.into_sink())
}

pub fn compile_to_string(src: &str) -> Result<String> {
    let sink = compile(src, TextSink::new(vec![]), &CompileOptions::default())?;
    Ok(String::from_utf8(sink.into_inner())?)
}

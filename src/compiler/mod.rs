//! The template compiler: lexing, expression parsing and code generation.

pub mod ast;
pub mod codegen;
pub mod instructions;
pub mod lexer;
pub mod parser;
pub mod tokens;

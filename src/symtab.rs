use std::collections::HashMap;

use snafu::{ensure, OptionExt};

use crate::codegen::asm::Label;
use crate::error::{CompileResult, DuplicateSymbolSnafu, UndeclaredSymbolSnafu};
use crate::types::PrimitiveType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Function { end_label: Label },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub ty: PrimitiveType,
    pub kind: SymbolKind,
}

impl Symbol {
    pub fn variable(name: impl Into<String>, ty: PrimitiveType) -> Symbol {
        Symbol {
            name: name.into(),
            ty,
            kind: SymbolKind::Variable,
        }
    }

    pub fn function(name: impl Into<String>, ty: PrimitiveType, end_label: Label) -> Symbol {
        Symbol {
            name: name.into(),
            ty,
            kind: SymbolKind::Function { end_label },
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, SymbolKind::Function { .. })
    }
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    pub fn insert(&mut self, symbol: Symbol) -> CompileResult<()> {
        ensure!(
            !self.symbols.contains_key(&symbol.name),
            DuplicateSymbolSnafu {
                name: symbol.name.as_str()
            }
        );
        self.symbols.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    pub fn get(&self, name: &str) -> CompileResult<&Symbol> {
        self.symbols.get(name).context(UndeclaredSymbolSnafu { name })
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

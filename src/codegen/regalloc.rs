use snafu::{ensure, OptionExt};

use crate::codegen::asm::AsmRegister;
use crate::error::{
    CompileResult, InvalidRegisterSnafu, RegisterAlreadyFreeSnafu, RegisterExhaustedSnafu,
};

const SCRATCH: [AsmRegister; 4] = [
    AsmRegister::R8,
    AsmRegister::R9,
    AsmRegister::R10,
    AsmRegister::R11,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reg(pub usize);

/// Free-list of the scratch registers.
///
/// A handle from [`RegStk::get`] is owned by the caller until it goes back
/// through [`RegStk::put`] exactly once.
#[derive(Debug)]
pub struct RegStk {
    free: Vec<usize>,
}

impl Default for RegStk {
    fn default() -> Self {
        let mut stk = RegStk { free: vec![] };
        stk.free_all();
        stk
    }
}

impl RegStk {
    pub fn new() -> RegStk {
        RegStk::default()
    }

    pub fn get(&mut self) -> CompileResult<Reg> {
        self.free.pop().map(Reg).context(RegisterExhaustedSnafu)
    }

    pub fn put(&mut self, reg: Reg) -> CompileResult<()> {
        ensure!(reg.0 < SCRATCH.len(), InvalidRegisterSnafu { index: reg.0 });
        ensure!(
            !self.free.contains(&reg.0),
            RegisterAlreadyFreeSnafu { index: reg.0 }
        );
        self.free.push(reg.0);
        Ok(())
    }

    pub fn free_all(&mut self) {
        self.free = (0..SCRATCH.len()).rev().collect();
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn capacity(&self) -> usize {
        SCRATCH.len()
    }

    pub fn in_use(&self) -> Vec<Reg> {
        (0..SCRATCH.len())
            .filter(|index| !self.free.contains(index))
            .map(Reg)
            .collect()
    }

    pub fn register(&self, reg: Reg) -> CompileResult<AsmRegister> {
        SCRATCH
            .get(reg.0)
            .copied()
            .context(InvalidRegisterSnafu { index: reg.0 })
    }
}

#![allow(dead_code)]

use std::collections::HashMap;

use anyhow::{bail, ensure, Context, Result};

use mcc::codegen::asm::{
    AsmBinaryOp, AsmInstruction, AsmOperand, AsmRegister, AsmType, ConditionCode, Label, Section,
};
use mcc::{compile, CompileOptions};

const DATA_BASE: u64 = 0x1000;
const STACK_TOP: u64 = 0x10_0000;
const HALT: u64 = u64::MAX;
const MAX_STEPS: usize = 1_000_000;

pub fn compile_program(src: &str) -> Result<Vec<AsmInstruction>> {
    compile(src, vec![], &CompileOptions::default())
}

/// What a finished run left behind.
#[derive(Debug)]
pub struct Run {
    pub ret: i64,
    pub output: Vec<i64>,
    pub machine: Machine,
}

/// Compiles `src` and runs `main` to completion.
pub fn run(src: &str) -> Run {
    let program = compile_program(src).unwrap_or_else(|e| panic!("{:#}", e));
    let mut machine = Machine::new(program);
    let ret = machine.call("main").unwrap_or_else(|e| panic!("{:#}", e));
    Run {
        ret,
        output: machine.output.clone(),
        machine,
    }
}

fn sign_extend(value: u64, asm_type: AsmType) -> u64 {
    match asm_type {
        AsmType::Byte => value as u8 as i8 as i64 as u64,
        AsmType::Longword => value as u32 as i32 as i64 as u64,
        AsmType::Quadword => value,
    }
}

fn mask(value: u64, asm_type: AsmType) -> u64 {
    match asm_type {
        AsmType::Byte => value & 0xff,
        AsmType::Longword => value & 0xffff_ffff,
        AsmType::Quadword => value,
    }
}

/// Just enough of an x86-64 machine to execute what the compiler emits.
///
/// `printf@PLT` is the only external symbol; it records `%rsi` and checks
/// the stack alignment the ABI promises it.
#[derive(Debug)]
pub struct Machine {
    program: Vec<AsmInstruction>,
    code: HashMap<String, usize>,
    labels: HashMap<Label, usize>,
    data: HashMap<String, u64>,
    memory: HashMap<u64, u8>,
    regs: HashMap<AsmRegister, u64>,
    flags: (i64, i64),
    pub output: Vec<i64>,
    pub steps: usize,
}

impl Machine {
    pub fn new(program: Vec<AsmInstruction>) -> Machine {
        let mut code = HashMap::new();
        let mut labels = HashMap::new();
        let mut data = HashMap::new();
        let mut memory = HashMap::new();
        let mut section = Section::Text;
        let mut next = DATA_BASE;

        for (index, instr) in program.iter().enumerate() {
            match instr {
                AsmInstruction::Section(s) => section = *s,
                AsmInstruction::Symbol(name) if section == Section::Text => {
                    code.insert(name.clone(), index);
                }
                AsmInstruction::Symbol(name) => {
                    data.insert(name.clone(), next);
                }
                AsmInstruction::Label(label) => {
                    labels.insert(*label, index);
                }
                AsmInstruction::Zero(asm_type) => next += asm_type.size() as u64,
                AsmInstruction::String(value) => {
                    for byte in value.bytes().chain(Some(0)) {
                        memory.insert(next, byte);
                        next += 1;
                    }
                }
                _ => {}
            }
        }

        Machine {
            program,
            code,
            labels,
            data,
            memory,
            regs: HashMap::new(),
            flags: (0, 0),
            output: vec![],
            steps: 0,
        }
    }

    pub fn address_of(&self, name: &str) -> Result<u64> {
        self.data
            .get(name)
            .copied()
            .with_context(|| format!("no data symbol '{}'", name))
    }

    /// Reads a global of the given width, sign-extended.
    pub fn global(&self, name: &str, asm_type: AsmType) -> Result<i64> {
        let raw = self.load(self.address_of(name)?, asm_type);
        Ok(sign_extend(raw, asm_type) as i64)
    }

    fn reg(&self, reg: AsmRegister) -> u64 {
        self.regs.get(&reg).copied().unwrap_or_default()
    }

    fn load(&self, address: u64, asm_type: AsmType) -> u64 {
        (0..asm_type.size() as u64).fold(0, |acc, i| {
            let byte = self.memory.get(&(address + i)).copied().unwrap_or_default();
            acc | (byte as u64) << (8 * i)
        })
    }

    fn store(&mut self, address: u64, asm_type: AsmType, value: u64) {
        for i in 0..asm_type.size() as u64 {
            self.memory.insert(address + i, (value >> (8 * i)) as u8);
        }
    }

    fn address(&self, operand: &AsmOperand) -> Result<u64> {
        match operand {
            AsmOperand::Data(name) => self.address_of(name),
            AsmOperand::Memory(reg) => Ok(self.reg(*reg)),
            _ => bail!("{:?} has no address", operand),
        }
    }

    fn read(&self, operand: &AsmOperand, asm_type: AsmType) -> Result<u64> {
        match operand {
            AsmOperand::Imm(n) => Ok(mask(*n as u64, asm_type)),
            AsmOperand::Register(reg) => Ok(mask(self.reg(*reg), asm_type)),
            _ => Ok(self.load(self.address(operand)?, asm_type)),
        }
    }

    fn write(&mut self, operand: &AsmOperand, asm_type: AsmType, value: u64) -> Result<()> {
        match operand {
            AsmOperand::Imm(_) => bail!("cannot write to an immediate"),
            AsmOperand::Register(reg) => {
                let value = match asm_type {
                    AsmType::Byte => (self.reg(*reg) & !0xff) | (value & 0xff),
                    // 32-bit writes clear the upper half
                    AsmType::Longword => value & 0xffff_ffff,
                    AsmType::Quadword => value,
                };
                self.regs.insert(*reg, value);
            }
            _ => {
                let address = self.address(operand)?;
                self.store(address, asm_type, value);
            }
        }
        Ok(())
    }

    fn push(&mut self, value: u64) {
        let sp = self.reg(AsmRegister::Sp) - 8;
        self.regs.insert(AsmRegister::Sp, sp);
        self.store(sp, AsmType::Quadword, value);
    }

    fn pop(&mut self) -> u64 {
        let sp = self.reg(AsmRegister::Sp);
        self.regs.insert(AsmRegister::Sp, sp + 8);
        self.load(sp, AsmType::Quadword)
    }

    fn holds(&self, condition: ConditionCode) -> bool {
        let (a, b) = self.flags;
        match condition {
            ConditionCode::E => a == b,
            ConditionCode::NE => a != b,
            ConditionCode::L => a < b,
            ConditionCode::G => a > b,
            ConditionCode::LE => a <= b,
            ConditionCode::GE => a >= b,
        }
    }

    fn jump(&self, label: Label) -> Result<usize> {
        self.labels
            .get(&label)
            .copied()
            .with_context(|| format!("no label {}", label))
    }

    /// Calls the function `name` with an empty stack and returns `%rax`.
    pub fn call(&mut self, name: &str) -> Result<i64> {
        self.regs.insert(AsmRegister::Sp, STACK_TOP);
        self.push(HALT);
        let mut pc = *self
            .code
            .get(name)
            .with_context(|| format!("no function '{}'", name))?;

        loop {
            self.steps += 1;
            ensure!(self.steps < MAX_STEPS, "gave up after {} steps", MAX_STEPS);

            let instr = self
                .program
                .get(pc)
                .cloned()
                .with_context(|| format!("ran off the end at {}", pc))?;
            pc += 1;

            match instr {
                AsmInstruction::Section(_)
                | AsmInstruction::Globl(_)
                | AsmInstruction::FunctionType(_)
                | AsmInstruction::Symbol(_)
                | AsmInstruction::Label(_) => {}

                AsmInstruction::Zero(_) | AsmInstruction::String(_) => {
                    bail!("executed data at {}", pc - 1)
                }

                AsmInstruction::Mov { asm_type, src, dst } => {
                    let value = self.read(&src, asm_type)?;
                    self.write(&dst, asm_type, value)?;
                }

                AsmInstruction::Movsx {
                    src_type,
                    src,
                    dst_type,
                    dst,
                } => {
                    let value = sign_extend(self.read(&src, src_type)?, src_type);
                    self.write(&dst, dst_type, value)?;
                }

                AsmInstruction::MovZeroExtend {
                    src_type,
                    src,
                    dst_type,
                    dst,
                } => {
                    let value = self.read(&src, src_type)?;
                    self.write(&dst, dst_type, value)?;
                }

                AsmInstruction::Lea { src, dst } => {
                    let address = self.address(&src)?;
                    self.write(&dst, AsmType::Quadword, address)?;
                }

                AsmInstruction::Binary { op, lhs, rhs } => {
                    let a = self.read(&rhs, AsmType::Quadword)? as i64;
                    let b = self.read(&lhs, AsmType::Quadword)? as i64;
                    let result = match op {
                        AsmBinaryOp::Add => a.wrapping_add(b),
                        AsmBinaryOp::Sub => a.wrapping_sub(b),
                        AsmBinaryOp::Mul => a.wrapping_mul(b),
                        AsmBinaryOp::Shl => a.wrapping_shl(b as u32),
                    };
                    self.write(&rhs, AsmType::Quadword, result as u64)?;
                }

                AsmInstruction::Cqo => {
                    let rax = self.reg(AsmRegister::Ax) as i64;
                    let rdx = if rax < 0 { u64::MAX } else { 0 };
                    self.regs.insert(AsmRegister::Dx, rdx);
                }

                AsmInstruction::Idiv(operand) => {
                    let divisor = self.read(&operand, AsmType::Quadword)? as i64;
                    ensure!(divisor != 0, "division by zero");
                    let rax = self.reg(AsmRegister::Ax) as i64;
                    self.regs
                        .insert(AsmRegister::Ax, rax.wrapping_div(divisor) as u64);
                    self.regs
                        .insert(AsmRegister::Dx, rax.wrapping_rem(divisor) as u64);
                }

                AsmInstruction::Cmp { lhs, rhs } => {
                    self.flags = (
                        self.read(&rhs, AsmType::Quadword)? as i64,
                        self.read(&lhs, AsmType::Quadword)? as i64,
                    );
                }

                AsmInstruction::SetCC { condition, operand } => {
                    let value = self.holds(condition) as u64;
                    self.write(&operand, AsmType::Byte, value)?;
                }

                AsmInstruction::Jmp(label) => pc = self.jump(label)?,

                AsmInstruction::JmpCC { condition, target } => {
                    if self.holds(condition) {
                        pc = self.jump(target)?;
                    }
                }

                AsmInstruction::Push(operand) => {
                    let value = self.read(&operand, AsmType::Quadword)?;
                    self.push(value);
                }

                AsmInstruction::Pop(operand) => {
                    let value = self.pop();
                    self.write(&operand, AsmType::Quadword, value)?;
                }

                AsmInstruction::Call(target) if target == "printf@PLT" => {
                    let sp = self.reg(AsmRegister::Sp);
                    ensure!(sp % 16 == 0, "misaligned stack {:#x} at printf", sp);
                    let value = self.reg(AsmRegister::Si) as i64;
                    self.output.push(value);
                    self.regs.insert(AsmRegister::Ax, 0);
                    // printf is free to clobber the caller-saved scratch registers
                    for reg in [
                        AsmRegister::R8,
                        AsmRegister::R9,
                        AsmRegister::R10,
                        AsmRegister::R11,
                    ] {
                        self.regs.insert(reg, 0xdead);
                    }
                }

                AsmInstruction::Call(target) => {
                    let entry = *self
                        .code
                        .get(&target)
                        .with_context(|| format!("no function '{}'", target))?;
                    self.push(pc as u64);
                    pc = entry;
                }

                AsmInstruction::Ret => {
                    let target = self.pop();
                    if target == HALT {
                        ensure!(
                            self.reg(AsmRegister::Sp) == STACK_TOP,
                            "unbalanced stack on return"
                        );
                        return Ok(self.reg(AsmRegister::Ax) as i64);
                    }
                    pc = target as usize;
                }
            }
        }
    }
}

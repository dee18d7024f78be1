use anyhow::Result;

use crate::{
    codegen::{
        asm::{
            AsmBinaryOp, AsmInstruction, AsmOperand, AsmRegister, AsmType, ConditionCode, Label,
            Section,
        },
        regalloc::{Reg, RegStk},
    },
    emitter::AsmSink,
    error::{CompileError, CompileResult, InvalidOperationSnafu, SemanticSnafu},
    parser::ast::{Ast, AstKind, AstOp, BinaryOp},
    symtab::{Symbol, SymbolTable},
    types::PrimitiveType,
};

pub const PRINTINT: &str = "printint";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionContext {
    pub name: String,
    pub ty: PrimitiveType,
    pub end_label: Label,
}

pub struct CodeGen<S: AsmSink> {
    sink: S,
    regs: RegStk,
    symbols: SymbolTable,
    next_label: usize,
}

fn invalid(op: impl std::fmt::Debug) -> CompileError {
    InvalidOperationSnafu {
        op: format!("{:?}", op),
    }
    .build()
}

impl<S: AsmSink> CodeGen<S> {
    pub fn new(sink: S) -> CompileResult<CodeGen<S>> {
        // The intrinsic's epilogue is not ours; label 0 is never handed out.
        let mut symbols = SymbolTable::new();
        symbols.insert(Symbol::function(PRINTINT, PrimitiveType::Void, Label(0)))?;

        Ok(CodeGen {
            sink,
            regs: RegStk::new(),
            symbols,
            next_label: 1,
        })
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn regs(&self) -> &RegStk {
        &self.regs
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    pub fn free_all(&mut self) {
        self.regs.free_all();
    }

    fn emit(&mut self, instr: AsmInstruction) -> Result<()> {
        self.sink.push(instr)
    }

    fn reg(&self, reg: Reg) -> CompileResult<AsmOperand> {
        Ok(AsmOperand::Register(self.regs.register(reg)?))
    }

    pub fn gen_preamble(&mut self) -> Result<()> {
        let instructions = vec![
            AsmInstruction::Section(Section::Rodata),
            AsmInstruction::Symbol(".LC0".to_owned()),
            AsmInstruction::String("%ld\n".to_owned()),
            AsmInstruction::Section(Section::Text),
            AsmInstruction::Symbol(PRINTINT.to_owned()),
            AsmInstruction::Push(AsmOperand::Register(AsmRegister::Bp)),
            AsmInstruction::Mov {
                asm_type: AsmType::Quadword,
                src: AsmOperand::Register(AsmRegister::Sp),
                dst: AsmOperand::Register(AsmRegister::Bp),
            },
            AsmInstruction::Mov {
                asm_type: AsmType::Quadword,
                src: AsmOperand::Register(AsmRegister::Di),
                dst: AsmOperand::Register(AsmRegister::Si),
            },
            AsmInstruction::Lea {
                src: AsmOperand::Data(".LC0".to_owned()),
                dst: AsmOperand::Register(AsmRegister::Di),
            },
            AsmInstruction::Mov {
                asm_type: AsmType::Longword,
                src: AsmOperand::Imm(0),
                dst: AsmOperand::Register(AsmRegister::Ax),
            },
            AsmInstruction::Call("printf@PLT".to_owned()),
            AsmInstruction::Pop(AsmOperand::Register(AsmRegister::Bp)),
            AsmInstruction::Ret,
        ];

        for instr in instructions {
            self.emit(instr)?;
        }

        Ok(())
    }

    pub fn gen_postamble(&mut self) -> Result<()> {
        self.emit(AsmInstruction::Section(Section::NoteGnuStack))?;
        self.sink.flush()
    }

    pub fn declare_global(&mut self, name: &str, ty: PrimitiveType) -> Result<()> {
        let asm_type = AsmType::try_from(ty).map_err(|_| {
            SemanticSnafu {
                message: format!("variable '{}' cannot have type {}", name, ty),
            }
            .build()
        })?;

        self.symbols.insert(Symbol::variable(name, ty))?;

        self.emit(AsmInstruction::Section(Section::Data))?;
        self.emit(AsmInstruction::Globl(name.to_owned()))?;
        self.emit(AsmInstruction::Symbol(name.to_owned()))?;
        self.emit(AsmInstruction::Zero(asm_type))?;

        Ok(())
    }

    pub fn declare_function(&mut self, name: &str, ty: PrimitiveType) -> Result<FunctionContext> {
        let end_label = self.new_label();
        self.symbols.insert(Symbol::function(name, ty, end_label))?;

        Ok(FunctionContext {
            name: name.to_owned(),
            ty,
            end_label,
        })
    }

    pub fn gen_function(&mut self, func: &FunctionContext, tree: &Ast) -> Result<()> {
        self.gen_ast(func, tree, None, None, AstOp::None)?;
        self.regs.free_all();
        Ok(())
    }

    /// Generates code for `node`, returning the register holding its value.
    ///
    /// `reg` holds the value an assignment stores into an lvalue. `label` is
    /// the false target of a comparison controlling an `if` or `while`.
    /// `parent` is the operation of the enclosing node.
    pub fn gen_ast(
        &mut self,
        func: &FunctionContext,
        node: &Ast,
        reg: Option<Reg>,
        label: Option<Label>,
        parent: AstOp,
    ) -> Result<Option<Reg>> {
        match &node.kind {
            AstKind::If {
                cond,
                then,
                otherwise,
            } => self.gen_if(func, cond, then.as_deref(), otherwise.as_deref()),

            AstKind::While { cond, body } => self.gen_while(func, cond, body.as_deref()),

            AstKind::Glue { left, right } => {
                self.gen_ast(func, left, None, None, AstOp::Glue)?;
                self.regs.free_all();
                self.gen_ast(func, right, None, None, AstOp::Glue)?;
                self.regs.free_all();
                Ok(None)
            }

            AstKind::Function { name, body } => {
                if *name != func.name {
                    return Err(invalid(node.op()).into());
                }
                self.gen_function_body(func, body.as_deref())?;
                Ok(None)
            }

            AstKind::Binary { op, left, right } => {
                let left_reg = self.gen_value(func, left, node.op())?;
                let right_reg = self.gen_value(func, right, node.op())?;

                match op {
                    BinaryOp::Add => self.add(left_reg, right_reg).map(Some),
                    BinaryOp::Sub => self.sub(left_reg, right_reg).map(Some),
                    BinaryOp::Mul => self.mul(left_reg, right_reg).map(Some),
                    BinaryOp::Div => self.div(left_reg, right_reg).map(Some),
                    _ => self.compare(*op, left_reg, right_reg, label, parent),
                }
            }

            AstKind::IntLit(value) => Ok(Some(self.load_int(*value)?)),

            AstKind::Ident(name) => {
                if node.rval || parent == AstOp::Deref {
                    Ok(Some(self.load_global(name)?))
                } else {
                    Ok(None)
                }
            }

            AstKind::LvIdent(name) => {
                let value = reg.ok_or_else(|| invalid(node.op()))?;
                self.store_global(value, name)?;
                Ok(Some(value))
            }

            AstKind::Assign { source, dest } => {
                let value = self.gen_value(func, source, node.op())?;
                let target = self.gen_ast(func, dest, Some(value), None, node.op())?;

                match (&dest.kind, target) {
                    (AstKind::LvIdent(_), Some(_)) => Ok(Some(value)),
                    (AstKind::Deref(_), Some(addr)) => {
                        self.store_deref(value, addr, dest.ty)?;
                        Ok(Some(value))
                    }
                    _ => Err(invalid(dest.op()).into()),
                }
            }

            AstKind::Print(expr) => {
                let value = self.gen_value(func, expr, node.op())?;
                self.print(value)?;
                Ok(None)
            }

            AstKind::Widen(expr) => self.gen_ast(func, expr, None, None, node.op()),

            AstKind::Return(expr) => {
                let value = self.gen_value(func, expr, node.op())?;
                self.ret(func, value)?;
                Ok(None)
            }

            AstKind::Call { name, arg } => {
                let value = self.gen_value(func, arg, node.op())?;
                self.call(name, value, node.ty)
            }

            AstKind::Deref(expr) => {
                let addr = self.gen_value(func, expr, node.op())?;
                if node.rval {
                    self.load(AsmOperand::Memory(self.regs.register(addr)?), node.ty, addr)?;
                }
                Ok(Some(addr))
            }

            AstKind::AddrOf(name) => Ok(Some(self.addr_of(name)?)),

            AstKind::Scale { value, size } => {
                let value = self.gen_value(func, value, node.op())?;
                self.scale(value, *size)?;
                Ok(Some(value))
            }
        }
    }

    fn gen_value(&mut self, func: &FunctionContext, node: &Ast, parent: AstOp) -> Result<Reg> {
        let value = self.gen_ast(func, node, None, None, parent)?;
        Ok(value.ok_or_else(|| invalid(node.op()))?)
    }

    fn gen_if(
        &mut self,
        func: &FunctionContext,
        cond: &Ast,
        then: Option<&Ast>,
        otherwise: Option<&Ast>,
    ) -> Result<Option<Reg>> {
        if !cond.is_comparison() {
            return Err(invalid(cond.op()).into());
        }

        let false_label = self.new_label();
        let end_label = otherwise.map(|_| self.new_label());

        self.gen_ast(func, cond, None, Some(false_label), AstOp::If)?;
        self.regs.free_all();

        if let Some(then) = then {
            self.gen_ast(func, then, None, None, AstOp::If)?;
            self.regs.free_all();
        }

        if let Some(end_label) = end_label {
            self.emit(AsmInstruction::Jmp(end_label))?;
        }

        self.emit(AsmInstruction::Label(false_label))?;

        if let (Some(otherwise), Some(end_label)) = (otherwise, end_label) {
            self.gen_ast(func, otherwise, None, None, AstOp::If)?;
            self.regs.free_all();
            self.emit(AsmInstruction::Label(end_label))?;
        }

        Ok(None)
    }

    fn gen_while(
        &mut self,
        func: &FunctionContext,
        cond: &Ast,
        body: Option<&Ast>,
    ) -> Result<Option<Reg>> {
        if !cond.is_comparison() {
            return Err(invalid(cond.op()).into());
        }

        let start_label = self.new_label();
        let end_label = self.new_label();

        self.emit(AsmInstruction::Label(start_label))?;

        self.gen_ast(func, cond, None, Some(end_label), AstOp::While)?;
        self.regs.free_all();

        if let Some(body) = body {
            self.gen_ast(func, body, None, None, AstOp::While)?;
            self.regs.free_all();
        }

        self.emit(AsmInstruction::Jmp(start_label))?;
        self.emit(AsmInstruction::Label(end_label))?;

        Ok(None)
    }

    fn gen_function_body(&mut self, func: &FunctionContext, body: Option<&Ast>) -> Result<()> {
        self.emit(AsmInstruction::Section(Section::Text))?;
        self.emit(AsmInstruction::Globl(func.name.clone()))?;
        self.emit(AsmInstruction::FunctionType(func.name.clone()))?;
        self.emit(AsmInstruction::Symbol(func.name.clone()))?;
        self.emit(AsmInstruction::Push(AsmOperand::Register(AsmRegister::Bp)))?;
        self.emit(AsmInstruction::Mov {
            asm_type: AsmType::Quadword,
            src: AsmOperand::Register(AsmRegister::Sp),
            dst: AsmOperand::Register(AsmRegister::Bp),
        })?;

        if let Some(body) = body {
            self.gen_ast(func, body, None, None, AstOp::Function)?;
            self.regs.free_all();
        }

        self.emit(AsmInstruction::Label(func.end_label))?;
        self.emit(AsmInstruction::Pop(AsmOperand::Register(AsmRegister::Bp)))?;
        self.emit(AsmInstruction::Ret)?;

        Ok(())
    }

    fn add(&mut self, left: Reg, right: Reg) -> Result<Reg> {
        self.emit(AsmInstruction::Binary {
            op: AsmBinaryOp::Add,
            lhs: self.reg(left)?,
            rhs: self.reg(right)?,
        })?;
        self.regs.put(left)?;
        Ok(right)
    }

    fn sub(&mut self, left: Reg, right: Reg) -> Result<Reg> {
        self.emit(AsmInstruction::Binary {
            op: AsmBinaryOp::Sub,
            lhs: self.reg(right)?,
            rhs: self.reg(left)?,
        })?;
        self.regs.put(right)?;
        Ok(left)
    }

    fn mul(&mut self, left: Reg, right: Reg) -> Result<Reg> {
        self.emit(AsmInstruction::Binary {
            op: AsmBinaryOp::Mul,
            lhs: self.reg(left)?,
            rhs: self.reg(right)?,
        })?;
        self.regs.put(left)?;
        Ok(right)
    }

    fn div(&mut self, left: Reg, right: Reg) -> Result<Reg> {
        self.emit(AsmInstruction::Mov {
            asm_type: AsmType::Quadword,
            src: self.reg(left)?,
            dst: AsmOperand::Register(AsmRegister::Ax),
        })?;
        self.emit(AsmInstruction::Cqo)?;
        self.emit(AsmInstruction::Idiv(self.reg(right)?))?;
        self.emit(AsmInstruction::Mov {
            asm_type: AsmType::Quadword,
            src: AsmOperand::Register(AsmRegister::Ax),
            dst: self.reg(left)?,
        })?;
        self.regs.put(right)?;
        Ok(left)
    }

    /// Compares `left` with `right`. Directly under `if`/`while` this jumps to
    /// `label` when the comparison is false and yields no register; anywhere
    /// else it leaves 0 or 1 in a register.
    fn compare(
        &mut self,
        op: BinaryOp,
        left: Reg,
        right: Reg,
        label: Option<Label>,
        parent: AstOp,
    ) -> Result<Option<Reg>> {
        let condition = ConditionCode::try_from(op)?;

        self.emit(AsmInstruction::Cmp {
            lhs: self.reg(right)?,
            rhs: self.reg(left)?,
        })?;

        if matches!(parent, AstOp::If | AstOp::While) {
            let target = label.ok_or_else(|| invalid(op))?;
            self.emit(AsmInstruction::JmpCC {
                condition: condition.inverse(),
                target,
            })?;
            self.regs.put(left)?;
            self.regs.put(right)?;
            return Ok(None);
        }

        self.emit(AsmInstruction::SetCC {
            condition,
            operand: self.reg(right)?,
        })?;
        self.emit(AsmInstruction::MovZeroExtend {
            src_type: AsmType::Byte,
            src: self.reg(right)?,
            dst_type: AsmType::Quadword,
            dst: self.reg(right)?,
        })?;
        self.regs.put(left)?;
        Ok(Some(right))
    }

    fn load_int(&mut self, value: i64) -> Result<Reg> {
        let reg = self.regs.get()?;
        self.emit(AsmInstruction::Mov {
            asm_type: AsmType::Quadword,
            src: AsmOperand::Imm(value),
            dst: self.reg(reg)?,
        })?;
        Ok(reg)
    }

    fn load(&mut self, src: AsmOperand, ty: PrimitiveType, reg: Reg) -> Result<()> {
        let dst = self.reg(reg)?;
        let instr = match AsmType::try_from(ty)? {
            AsmType::Byte => AsmInstruction::MovZeroExtend {
                src_type: AsmType::Byte,
                src,
                dst_type: AsmType::Quadword,
                dst,
            },
            AsmType::Longword => AsmInstruction::Movsx {
                src_type: AsmType::Longword,
                src,
                dst_type: AsmType::Quadword,
                dst,
            },
            AsmType::Quadword => AsmInstruction::Mov {
                asm_type: AsmType::Quadword,
                src,
                dst,
            },
        };
        self.emit(instr)
    }

    fn load_global(&mut self, name: &str) -> Result<Reg> {
        let ty = self.symbols.get(name)?.ty;
        let reg = self.regs.get()?;
        self.load(AsmOperand::Data(name.to_owned()), ty, reg)?;
        Ok(reg)
    }

    fn store_global(&mut self, value: Reg, name: &str) -> Result<()> {
        let ty = self.symbols.get(name)?.ty;
        self.emit(AsmInstruction::Mov {
            asm_type: AsmType::try_from(ty)?,
            src: self.reg(value)?,
            dst: AsmOperand::Data(name.to_owned()),
        })
    }

    fn store_deref(&mut self, value: Reg, addr: Reg, ty: PrimitiveType) -> Result<()> {
        self.emit(AsmInstruction::Mov {
            asm_type: AsmType::try_from(ty)?,
            src: self.reg(value)?,
            dst: AsmOperand::Memory(self.regs.register(addr)?),
        })?;
        self.regs.put(addr)?;
        Ok(())
    }

    fn addr_of(&mut self, name: &str) -> Result<Reg> {
        let reg = self.regs.get()?;
        self.emit(AsmInstruction::Lea {
            src: AsmOperand::Data(name.to_owned()),
            dst: self.reg(reg)?,
        })?;
        Ok(reg)
    }

    fn scale(&mut self, value: Reg, size: usize) -> Result<()> {
        match size {
            1 => Ok(()),
            2 | 4 | 8 => self.emit(AsmInstruction::Binary {
                op: AsmBinaryOp::Shl,
                lhs: AsmOperand::Imm(size.trailing_zeros() as i64),
                rhs: self.reg(value)?,
            }),
            _ => self.emit(AsmInstruction::Binary {
                op: AsmBinaryOp::Mul,
                lhs: AsmOperand::Imm(size as i64),
                rhs: self.reg(value)?,
            }),
        }
    }

    fn ret(&mut self, func: &FunctionContext, value: Reg) -> Result<()> {
        let src = self.reg(value)?;
        let instr = match AsmType::try_from(func.ty)? {
            AsmType::Byte => AsmInstruction::MovZeroExtend {
                src_type: AsmType::Byte,
                src,
                dst_type: AsmType::Longword,
                dst: AsmOperand::Register(AsmRegister::Ax),
            },
            asm_type => AsmInstruction::Mov {
                asm_type,
                src,
                dst: AsmOperand::Register(AsmRegister::Ax),
            },
        };
        self.emit(instr)?;
        self.regs.put(value)?;
        self.emit(AsmInstruction::Jmp(func.end_label))
    }

    fn print(&mut self, value: Reg) -> Result<()> {
        self.emit(AsmInstruction::Mov {
            asm_type: AsmType::Quadword,
            src: self.reg(value)?,
            dst: AsmOperand::Register(AsmRegister::Di),
        })?;
        self.regs.put(value)?;
        self.call_preserving(PRINTINT)
    }

    fn call(&mut self, name: &str, arg: Reg, ty: PrimitiveType) -> Result<Option<Reg>> {
        self.emit(AsmInstruction::Mov {
            asm_type: AsmType::Quadword,
            src: self.reg(arg)?,
            dst: AsmOperand::Register(AsmRegister::Di),
        })?;
        self.regs.put(arg)?;
        self.call_preserving(name)?;

        if ty == PrimitiveType::Void {
            return Ok(None);
        }

        let reg = self.regs.get()?;
        self.load(AsmOperand::Register(AsmRegister::Ax), ty, reg)?;
        Ok(Some(reg))
    }

    // Live scratch registers are pushed around the call.
    fn call_preserving(&mut self, name: &str) -> Result<()> {
        let live = self
            .regs
            .in_use()
            .into_iter()
            .map(|reg| self.regs.register(reg))
            .collect::<CompileResult<Vec<_>>>()?;
        let padded = live.len() % 2 == 1;

        for reg in &live {
            self.emit(AsmInstruction::Push(AsmOperand::Register(*reg)))?;
        }
        if padded {
            self.emit(AsmInstruction::Binary {
                op: AsmBinaryOp::Sub,
                lhs: AsmOperand::Imm(8),
                rhs: AsmOperand::Register(AsmRegister::Sp),
            })?;
        }

        self.emit(AsmInstruction::Call(name.to_owned()))?;

        if padded {
            self.emit(AsmInstruction::Binary {
                op: AsmBinaryOp::Add,
                lhs: AsmOperand::Imm(8),
                rhs: AsmOperand::Register(AsmRegister::Sp),
            })?;
        }
        for reg in live.iter().rev() {
            self.emit(AsmInstruction::Pop(AsmOperand::Register(*reg)))?;
        }

        Ok(())
    }
}

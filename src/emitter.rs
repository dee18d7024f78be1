use std::io::Write;

use anyhow::Result;

use crate::codegen::asm::{
    AsmBinaryOp, AsmInstruction, AsmOperand, AsmRegister, AsmType, ConditionCode, Section,
};

pub trait AsmSink {
    fn push(&mut self, instr: AsmInstruction) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: AsmSink + ?Sized> AsmSink for &mut S {
    fn push(&mut self, instr: AsmInstruction) -> Result<()> {
        (**self).push(instr)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

impl AsmSink for Vec<AsmInstruction> {
    fn push(&mut self, instr: AsmInstruction) -> Result<()> {
        Vec::push(self, instr);
        Ok(())
    }
}

pub struct TextSink<W: Write> {
    out: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W) -> TextSink<W> {
        TextSink { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> AsmSink for TextSink<W> {
    fn push(&mut self, instr: AsmInstruction) -> Result<()> {
        instr.emit(&mut self.out)
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

pub trait Emit {
    fn emit(&self, f: &mut dyn Write) -> Result<()>;
}

impl Emit for Vec<AsmInstruction> {
    fn emit(&self, f: &mut dyn Write) -> Result<()> {
        for instr in self {
            instr.emit(f)?;
        }

        Ok(())
    }
}

fn suffix(asm_type: AsmType) -> &'static str {
    match asm_type {
        AsmType::Byte => "b",
        AsmType::Longword => "l",
        AsmType::Quadword => "q",
    }
}

fn condition_suffix(condition: ConditionCode) -> &'static str {
    match condition {
        ConditionCode::E => "e",
        ConditionCode::NE => "ne",
        ConditionCode::L => "l",
        ConditionCode::G => "g",
        ConditionCode::LE => "le",
        ConditionCode::GE => "ge",
    }
}

impl Emit for AsmInstruction {
    fn emit(&self, f: &mut dyn Write) -> Result<()> {
        match self {
            AsmInstruction::Section(section) => match section {
                Section::Text => writeln!(f, "\t.text")?,
                Section::Data => writeln!(f, "\t.data")?,
                Section::Rodata => writeln!(f, "\t.section .rodata")?,
                Section::NoteGnuStack => writeln!(f, "\t.section .note.GNU-stack,\"\",@progbits")?,
            },

            AsmInstruction::Globl(name) => writeln!(f, "\t.globl {}", name)?,

            AsmInstruction::FunctionType(name) => writeln!(f, "\t.type {}, @function", name)?,

            AsmInstruction::Symbol(name) => writeln!(f, "{}:", name)?,

            AsmInstruction::Label(label) => writeln!(f, "{}:", label)?,

            AsmInstruction::Zero(asm_type) => match asm_type {
                AsmType::Byte => writeln!(f, "\t.byte 0")?,
                AsmType::Longword => writeln!(f, "\t.long 0")?,
                AsmType::Quadword => writeln!(f, "\t.quad 0")?,
            },

            AsmInstruction::String(value) => {
                writeln!(f, "\t.string \"{}\"", value.escape_default())?
            }

            AsmInstruction::Mov { asm_type, src, dst } => {
                let instr = match src {
                    AsmOperand::Imm(n) if i32::try_from(*n).is_err() => "movabsq".to_owned(),
                    _ => format!("mov{}", suffix(*asm_type)),
                };
                write!(f, "\t{} ", instr)?;
                src.emit(f, *asm_type)?;
                write!(f, ", ")?;
                dst.emit(f, *asm_type)?;
                writeln!(f)?;
            }

            AsmInstruction::Movsx {
                src_type,
                src,
                dst_type,
                dst,
            } => {
                write!(f, "\tmovs{}{} ", suffix(*src_type), suffix(*dst_type))?;
                src.emit(f, *src_type)?;
                write!(f, ", ")?;
                dst.emit(f, *dst_type)?;
                writeln!(f)?;
            }

            AsmInstruction::MovZeroExtend {
                src_type,
                src,
                dst_type,
                dst,
            } => {
                write!(f, "\tmovz{}{} ", suffix(*src_type), suffix(*dst_type))?;
                src.emit(f, *src_type)?;
                write!(f, ", ")?;
                dst.emit(f, *dst_type)?;
                writeln!(f)?;
            }

            AsmInstruction::Lea { src, dst } => {
                write!(f, "\tleaq ")?;
                src.emit(f, AsmType::Quadword)?;
                write!(f, ", ")?;
                dst.emit(f, AsmType::Quadword)?;
                writeln!(f)?;
            }

            AsmInstruction::Binary { op, lhs, rhs } => {
                let instr = match op {
                    AsmBinaryOp::Add => "addq",
                    AsmBinaryOp::Sub => "subq",
                    AsmBinaryOp::Mul => "imulq",
                    AsmBinaryOp::Shl => "salq",
                };
                write!(f, "\t{} ", instr)?;
                lhs.emit(f, AsmType::Quadword)?;
                write!(f, ", ")?;
                rhs.emit(f, AsmType::Quadword)?;
                writeln!(f)?;
            }

            AsmInstruction::Cqo => writeln!(f, "\tcqo")?,

            AsmInstruction::Idiv(operand) => {
                write!(f, "\tidivq ")?;
                operand.emit(f, AsmType::Quadword)?;
                writeln!(f)?;
            }

            AsmInstruction::Cmp { lhs, rhs } => {
                write!(f, "\tcmpq ")?;
                lhs.emit(f, AsmType::Quadword)?;
                write!(f, ", ")?;
                rhs.emit(f, AsmType::Quadword)?;
                writeln!(f)?;
            }

            AsmInstruction::SetCC { condition, operand } => {
                write!(f, "\tset{} ", condition_suffix(*condition))?;
                operand.emit(f, AsmType::Byte)?;
                writeln!(f)?;
            }

            AsmInstruction::Jmp(target) => writeln!(f, "\tjmp {}", target)?,

            AsmInstruction::JmpCC { condition, target } => {
                writeln!(f, "\tj{} {}", condition_suffix(*condition), target)?
            }

            AsmInstruction::Push(operand) => {
                write!(f, "\tpushq ")?;
                operand.emit(f, AsmType::Quadword)?;
                writeln!(f)?;
            }

            AsmInstruction::Pop(operand) => {
                write!(f, "\tpopq ")?;
                operand.emit(f, AsmType::Quadword)?;
                writeln!(f)?;
            }

            AsmInstruction::Call(target) => writeln!(f, "\tcall {}", target)?,

            AsmInstruction::Ret => writeln!(f, "\tret")?,
        }

        Ok(())
    }
}

impl AsmOperand {
    fn emit(&self, f: &mut dyn Write, asm_type: AsmType) -> Result<()> {
        match self {
            AsmOperand::Imm(n) => write!(f, "${}", n)?,
            AsmOperand::Register(reg) => reg.emit(f, asm_type)?,
            AsmOperand::Data(name) => write!(f, "{}(%rip)", name)?,
            AsmOperand::Memory(reg) => {
                write!(f, "(")?;
                reg.emit(f, AsmType::Quadword)?;
                write!(f, ")")?;
            }
        }
        Ok(())
    }
}

impl AsmRegister {
    fn emit(&self, f: &mut dyn Write, asm_type: AsmType) -> Result<()> {
        use AsmRegister::*;
        use AsmType::*;

        let name = match (self, asm_type) {
            (Ax, Byte) => "%al",
            (Dx, Byte) => "%dl",
            (Di, Byte) => "%dil",
            (Si, Byte) => "%sil",
            (Sp, Byte) => "%spl",
            (Bp, Byte) => "%bpl",
            (R8, Byte) => "%r8b",
            (R9, Byte) => "%r9b",
            (R10, Byte) => "%r10b",
            (R11, Byte) => "%r11b",

            (Ax, Longword) => "%eax",
            (Dx, Longword) => "%edx",
            (Di, Longword) => "%edi",
            (Si, Longword) => "%esi",
            (Sp, Longword) => "%esp",
            (Bp, Longword) => "%ebp",
            (R8, Longword) => "%r8d",
            (R9, Longword) => "%r9d",
            (R10, Longword) => "%r10d",
            (R11, Longword) => "%r11d",

            (Ax, Quadword) => "%rax",
            (Dx, Quadword) => "%rdx",
            (Di, Quadword) => "%rdi",
            (Si, Quadword) => "%rsi",
            (Sp, Quadword) => "%rsp",
            (Bp, Quadword) => "%rbp",
            (R8, Quadword) => "%r8",
            (R9, Quadword) => "%r9",
            (R10, Quadword) => "%r10",
            (R11, Quadword) => "%r11",
        };
        write!(f, "{}", name)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::asm::Label;

    fn render(instrs: Vec<AsmInstruction>) -> String {
        let mut out = vec![];
        instrs.emit(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn widths_pick_suffix_and_register_names() {
        let text = render(vec![
            AsmInstruction::Mov {
                asm_type: AsmType::Byte,
                src: AsmOperand::Register(AsmRegister::R9),
                dst: AsmOperand::Data("c".to_owned()),
            },
            AsmInstruction::Movsx {
                src_type: AsmType::Longword,
                src: AsmOperand::Data("i".to_owned()),
                dst_type: AsmType::Quadword,
                dst: AsmOperand::Register(AsmRegister::R8),
            },
            AsmInstruction::MovZeroExtend {
                src_type: AsmType::Byte,
                src: AsmOperand::Memory(AsmRegister::R10),
                dst_type: AsmType::Quadword,
                dst: AsmOperand::Register(AsmRegister::R10),
            },
        ]);

        assert_eq!(
            text,
            "\tmovb %r9b, c(%rip)\n\tmovslq i(%rip), %r8\n\tmovzbq (%r10), %r10\n"
        );
    }

    #[test]
    fn wide_immediates_use_movabs() {
        let text = render(vec![
            AsmInstruction::Mov {
                asm_type: AsmType::Quadword,
                src: AsmOperand::Imm(5),
                dst: AsmOperand::Register(AsmRegister::R8),
            },
            AsmInstruction::Mov {
                asm_type: AsmType::Quadword,
                src: AsmOperand::Imm(1 << 40),
                dst: AsmOperand::Register(AsmRegister::R8),
            },
        ]);

        assert_eq!(
            text,
            "\tmovq $5, %r8\n\tmovabsq $1099511627776, %r8\n"
        );
    }

    #[test]
    fn control_flow() {
        let text = render(vec![
            AsmInstruction::Cmp {
                lhs: AsmOperand::Register(AsmRegister::R9),
                rhs: AsmOperand::Register(AsmRegister::R8),
            },
            AsmInstruction::JmpCC {
                condition: ConditionCode::NE,
                target: Label(3),
            },
            AsmInstruction::Jmp(Label(4)),
            AsmInstruction::Label(Label(3)),
        ]);

        assert_eq!(text, "\tcmpq %r9, %r8\n\tjne L3\n\tjmp L4\nL3:\n");
    }

    #[test]
    fn text_sink_writes_through() {
        let mut sink = TextSink::new(vec![]);
        sink.push(AsmInstruction::Section(Section::Data)).unwrap();
        sink.push(AsmInstruction::Zero(AsmType::Longword)).unwrap();
        sink.flush().unwrap();
        assert_eq!(
            String::from_utf8(sink.into_inner()).unwrap(),
            "\t.data\n\t.long 0\n"
        );
    }
}

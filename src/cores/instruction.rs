use std::fmt;

use super::registers::Pointer;

/// How an indirect load/store treats its pointer register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Plain,
    PostInc,
    PreDec,
    Displacement(u8),
}

impl Mode {
    /// Operand text, e.g. `X`, `Y+`, `-Z`, `Y+63`.
    pub fn format(self, ptr: Pointer) -> String {
        match self {
            Mode::Plain => format!("{}", ptr),
            Mode::PostInc => format!("{}+", ptr),
            Mode::PreDec => format!("-{}", ptr),
            Mode::Displacement(q) => format!("{}+{}", ptr, q),
        }
    }

    pub fn writes_back(self) -> bool {
        matches!(self, Mode::PostInc | Mode::PreDec)
    }
}

#[allow(non_snake_case)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    NOP,
    MOVW { Rd: u8, Rr: u8 },
    MOV { Rd: u8, Rr: u8 },
    MULS { Rd: u8, Rr: u8 },
    LD { Rd: u8, ptr: Pointer, mode: Mode },
    LDS { Rd: u8 },
    ST { Rr: u8, ptr: Pointer, mode: Mode },
    STS { Rr: u8 },
    LPM { Rd: u8, inc: bool },
    POP { Rd: u8 },
    PUSH { Rr: u8 },
    LDI { Rd: u8, val: u8 },
    RJMP { offset: i16 },
}

/// One decoded instruction. Built fresh by every decode and thrown away after
/// it has been executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: u16,
    pub verb: &'static str,
    pub operands: Vec<String>,
    pub mnemonic: String,
    pub cycles: u8,
    pub words: u8,
    pub op: Operation,
}

impl Instruction {
    pub fn new(
        opcode: u16,
        verb: &'static str,
        operands: Vec<String>,
        cycles: u8,
        op: Operation,
    ) -> Self {
        let mnemonic = render(verb, &operands);
        Instruction {
            opcode,
            verb,
            operands,
            mnemonic,
            cycles,
            words: 1,
            op,
        }
    }

    /// For instructions that carry a second word in program memory.
    pub fn with_words(mut self, words: u8) -> Self {
        self.words = words;
        self
    }

    pub fn operand(&self, index: usize) -> Option<&str> {
        self.operands.get(index).map(String::as_str)
    }

    /// Mnemonic with the `k` placeholder of a two-word instruction replaced by
    /// its address word.
    pub fn with_address(&self, k: u16) -> String {
        let operands: Vec<String> = self
            .operands
            .iter()
            .map(|o| if o == "k" { format!("0x{:04X}", k) } else { o.clone() })
            .collect();
        render(self.verb, &operands)
    }
}

fn render(verb: &str, operands: &[String]) -> String {
    if operands.is_empty() {
        verb.to_string()
    } else {
        format!("{} {}", verb, operands.join(", "))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mnemonic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonic_joins_operands() {
        let op = Operation::MOV { Rd: 0, Rr: 1 };
        let i = Instruction::new(0x2C01, "MOV", vec!["r0".into(), "r1".into()], 1, op);
        assert_eq!(i.mnemonic, "MOV r0, r1");
        assert_eq!(i.to_string(), "MOV r0, r1");
        assert_eq!(i.operand(0), Some("r0"));
        assert_eq!(i.operand(2), None);
        assert_eq!(i.words, 1);

        let nop = Instruction::new(0, "NOP", vec![], 1, Operation::NOP);
        assert_eq!(nop.mnemonic, "NOP");
    }

    #[test]
    fn address_word_fills_placeholder() {
        let operands = vec!["r16".into(), "k".into()];
        let lds =
            Instruction::new(0x9100, "LDS", operands, 2, Operation::LDS { Rd: 16 }).with_words(2);
        assert_eq!(lds.mnemonic, "LDS r16, k");
        assert_eq!(lds.with_address(0x052D), "LDS r16, 0x052D");

        let operands = vec!["k".into(), "r7".into()];
        let sts = Instruction::new(0x9270, "STS", operands, 2, Operation::STS { Rr: 7 });
        assert_eq!(sts.with_address(0x0600), "STS 0x0600, r7");

        let operands = vec!["r0".into(), "r1".into()];
        let mov = Instruction::new(0x2C01, "MOV", operands, 1, Operation::MOV { Rd: 0, Rr: 1 });
        assert_eq!(mov.with_address(0x1234), "MOV r0, r1");
    }

    #[test]
    fn addressing_mode_text() {
        assert_eq!(Mode::Plain.format(Pointer::X), "X");
        assert_eq!(Mode::PostInc.format(Pointer::Y), "Y+");
        assert_eq!(Mode::PreDec.format(Pointer::Z), "-Z");
        assert_eq!(Mode::Displacement(63).format(Pointer::Y), "Y+63");
        assert!(Mode::PostInc.writes_back());
        assert!(Mode::PreDec.writes_back());
        assert!(!Mode::Plain.writes_back());
        assert!(!Mode::Displacement(1).writes_back());
    }
}

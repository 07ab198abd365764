//! Opcode decoder.
//!
//! Dispatch runs on the top nibble, then on secondary nibbles or masks inside
//! each group. Every handler re-checks that it owns the word it was given, so a
//! misrouted word surfaces as `DecoderMismatch` instead of being misdecoded.

use bitmatch::bitmatch;

use super::instruction::{Instruction, Mode, Operation};
use super::registers::Pointer;
use crate::errors::{Error, Result};

pub fn decode(opcode: u16) -> Result<Instruction> {
    match nibble(opcode, 3) {
        0x0 => group_0(opcode),
        0x1 => group_1(opcode),
        0x2 => group_2(opcode),
        0x3 => immediate(opcode, 0x3, "CPI"),
        0x4 => immediate(opcode, 0x4, "SBCI"),
        0x5 => immediate(opcode, 0x5, "SUBI"),
        0x6 => immediate(opcode, 0x6, "ORI"),
        0x7 => immediate(opcode, 0x7, "ANDI"),
        0x8 | 0xA => displaced(opcode),
        0x9 => group_9(opcode),
        0xB => group_b(opcode),
        0xC => rjmp(opcode),
        0xD => rcall(opcode),
        0xE => ldi(opcode),
        0xF => group_f(opcode),
        _ => Err(Error::UnreachableDecode { opcode }),
    }
}

/// Reassembles the 6-bit `q` of `10q0_qq?d_dddd_?qqq`.
pub fn displacement(opcode: u16) -> u8 {
    let q = (opcode & 0b111) | ((opcode >> 7) & 0b11000) | ((opcode >> 8) & 0b100000);
    (q & 0x3F) as u8
}

fn nibble(opcode: u16, n: u8) -> u8 {
    ((opcode >> (4 * n)) & 0xF) as u8
}

fn mismatch(handler: &'static str, opcode: u16) -> Error {
    Error::DecoderMismatch { handler, opcode }
}

fn unsupported(opcode: u16, instruction: impl Into<String>) -> Error {
    Error::UnsupportedInstruction {
        opcode,
        instruction: instruction.into(),
    }
}

fn expect_group(handler: &'static str, opcode: u16, group: u8) -> Result<()> {
    if nibble(opcode, 3) == group {
        Ok(())
    } else {
        Err(mismatch(handler, opcode))
    }
}

/// `????_??rd_dddd_rrrr` rendered for diagnostics.
fn two_register(verb: &str, opcode: u16) -> String {
    let d = (opcode >> 4) & 0x1F;
    let r = (opcode & 0xF) | ((opcode >> 5) & 0x10);
    format!("{} r{}, r{}", verb, d, r)
}

fn reg(r: u16) -> String {
    format!("r{}", r)
}

fn group_0(opcode: u16) -> Result<Instruction> {
    expect_group("group_0", opcode, 0x0)?;
    match nibble(opcode, 2) {
        0x0 if opcode == 0 => nop(opcode),
        0x0 => Err(Error::ReservedOpcode { opcode }),
        0x1 => movw(opcode),
        0x2 => muls(opcode),
        0x3 => Err(unsupported(opcode, "MULSU/FMUL/FMULS/FMULSU")),
        0x4..=0x7 => Err(unsupported(opcode, two_register("CPC", opcode))),
        0x8..=0xB => Err(unsupported(opcode, two_register("SBC", opcode))),
        0xC..=0xF => Err(unsupported(opcode, two_register("ADD", opcode))),
        _ => Err(Error::UnreachableDecode { opcode }),
    }
}

fn group_1(opcode: u16) -> Result<Instruction> {
    expect_group("group_1", opcode, 0x1)?;
    let verb = match nibble(opcode, 2) {
        0x0..=0x3 => "CPSE",
        0x4..=0x7 => "CP",
        0x8..=0xB => "SUB",
        0xC..=0xF => "ADC",
        _ => return Err(Error::UnreachableDecode { opcode }),
    };
    Err(unsupported(opcode, two_register(verb, opcode)))
}

fn group_2(opcode: u16) -> Result<Instruction> {
    expect_group("group_2", opcode, 0x2)?;
    match nibble(opcode, 2) {
        0x0..=0x3 => Err(unsupported(opcode, two_register("AND", opcode))),
        0x4..=0x7 => Err(unsupported(opcode, two_register("EOR", opcode))),
        0x8..=0xB => Err(unsupported(opcode, two_register("OR", opcode))),
        0xC..=0xF => mov(opcode),
        _ => Err(Error::UnreachableDecode { opcode }),
    }
}

/// CPI, SBCI, SUBI, ORI and ANDI: `gggg_kkkk_dddd_kkkk` on r16..r31.
fn immediate(opcode: u16, group: u8, verb: &'static str) -> Result<Instruction> {
    expect_group(verb, opcode, group)?;
    let d = nibble(opcode, 1) + 16;
    let k = (nibble(opcode, 2) << 4) | nibble(opcode, 0);
    Err(unsupported(opcode, format!("{} r{}, 0x{:02X}", verb, d, k)))
}

fn group_9(opcode: u16) -> Result<Instruction> {
    expect_group("group_9", opcode, 0x9)?;

    if opcode == 0x95C8 {
        return lpm(opcode);
    }

    match nibble(opcode, 2) {
        0x0 | 0x1 => match nibble(opcode, 0) {
            0x0 => lds_sts(opcode),
            0x1 | 0x2 | 0x9 | 0xA | 0xC..=0xE => indirect(opcode),
            0x3 | 0x8 | 0xB => Err(Error::ReservedOpcode { opcode }),
            0x4 | 0x5 => lpm(opcode),
            0x6 | 0x7 => Err(unsupported(opcode, "ELPM")),
            0xF => pop_push(opcode),
            _ => Err(Error::UnreachableDecode { opcode }),
        },
        0x2 | 0x3 => match nibble(opcode, 0) {
            0x0 => lds_sts(opcode),
            0x1 | 0x2 | 0x9 | 0xA | 0xC..=0xE => indirect(opcode),
            0x3 | 0x8 | 0xB => Err(Error::ReservedOpcode { opcode }),
            0x4 => Err(unsupported(opcode, "XCH")),
            0x5 => Err(unsupported(opcode, "LAS")),
            0x6 => Err(unsupported(opcode, "LAC")),
            0x7 => Err(unsupported(opcode, "LAT")),
            0xF => pop_push(opcode),
            _ => Err(Error::UnreachableDecode { opcode }),
        },
        0x4 | 0x5 => one_operand(opcode),
        0x6 => Err(unsupported(opcode, "ADIW")),
        0x7 => Err(unsupported(opcode, "SBIW")),
        0x8 => Err(unsupported(opcode, "CBI")),
        0x9 => Err(unsupported(opcode, "SBIC")),
        0xA => Err(unsupported(opcode, "SBI")),
        0xB => Err(unsupported(opcode, "SBIS")),
        0xC..=0xF => Err(unsupported(opcode, two_register("MUL", opcode))),
        _ => Err(Error::UnreachableDecode { opcode }),
    }
}

/// `1001_010?_????_????`
fn one_operand(opcode: u16) -> Result<Instruction> {
    if opcode & 0xFE00 != 0x9400 {
        return Err(mismatch("one_operand", opcode));
    }
    let d = (opcode >> 4) & 0x1F;
    let instruction = match nibble(opcode, 0) {
        0x0 => format!("COM r{}", d),
        0x1 => format!("NEG r{}", d),
        0x2 => format!("SWAP r{}", d),
        0x3 => format!("INC r{}", d),
        0x4 => return Err(Error::ReservedOpcode { opcode }),
        0x5 => format!("ASR r{}", d),
        0x6 => format!("LSR r{}", d),
        0x7 => format!("ROR r{}", d),
        0x8 if opcode & 0x0100 == 0 => {
            let s = (opcode >> 4) & 0b111;
            if opcode & 0x0080 == 0 {
                format!("BSET {}", s)
            } else {
                format!("BCLR {}", s)
            }
        }
        0x8 => control(opcode)?.to_string(),
        0x9 => match opcode {
            0x9409 => "IJMP".to_string(),
            0x9419 => "EIJMP".to_string(),
            0x9509 => "ICALL".to_string(),
            0x9519 => "EICALL".to_string(),
            _ => return Err(Error::ReservedOpcode { opcode }),
        },
        0xA => format!("DEC r{}", d),
        0xB if opcode & 0x0100 == 0 => format!("DES 0x{:X}", (opcode >> 4) & 0xF),
        0xB => return Err(Error::ReservedOpcode { opcode }),
        0xC | 0xD => "JMP".to_string(),
        0xE | 0xF => "CALL".to_string(),
        _ => return Err(Error::UnreachableDecode { opcode }),
    };
    Err(unsupported(opcode, instruction))
}

/// `1001_0101_????_1000`
fn control(opcode: u16) -> Result<&'static str> {
    match opcode {
        0x9508 => Ok("RET"),
        0x9518 => Ok("RETI"),
        0x9588 => Ok("SLEEP"),
        0x9598 => Ok("BREAK"),
        0x95A8 => Ok("WDR"),
        0x95D8 => Ok("ELPM"),
        0x95E8 => Ok("SPM"),
        0x95F8 => Ok("SPM Z+"),
        0x9528..=0x9578 | 0x95B8 => Err(Error::ReservedOpcode { opcode }),
        _ => Err(mismatch("control", opcode)),
    }
}

fn group_b(opcode: u16) -> Result<Instruction> {
    expect_group("group_b", opcode, 0xB)?;
    if opcode & 0x0800 == 0 {
        Err(unsupported(opcode, "IN"))
    } else {
        Err(unsupported(opcode, "OUT"))
    }
}

fn rcall(opcode: u16) -> Result<Instruction> {
    expect_group("rcall", opcode, 0xD)?;
    let offset = (((opcode & 0x0FFF) << 4) as i16) >> 4;
    Err(unsupported(opcode, format!("RCALL {:+}", offset)))
}

fn group_f(opcode: u16) -> Result<Instruction> {
    expect_group("group_f", opcode, 0xF)?;
    match (opcode >> 9) & 0b111 {
        0b000 | 0b001 => Err(unsupported(opcode, "BRBS")),
        0b010 | 0b011 => Err(unsupported(opcode, "BRBC")),
        _ if opcode & 0x0008 != 0 => Err(Error::ReservedOpcode { opcode }),
        0b100 => Err(unsupported(opcode, "BLD")),
        0b101 => Err(unsupported(opcode, "BST")),
        0b110 => Err(unsupported(opcode, "SBRC")),
        0b111 => Err(unsupported(opcode, "SBRS")),
        _ => Err(Error::UnreachableDecode { opcode }),
    }
}

#[bitmatch]
fn nop(opcode: u16) -> Result<Instruction> {
    #[bitmatch]
    match opcode {
        "0000_0000_0000_0000" => Ok(Instruction::new(opcode, "NOP", vec![], 1, Operation::NOP)),
        _ => Err(mismatch("nop", opcode)),
    }
}

#[bitmatch]
fn movw(opcode: u16) -> Result<Instruction> {
    #[bitmatch]
    match opcode {
        "0000_0001_dddd_rrrr" => {
            let (d, r) = (d << 1, r << 1);
            Ok(Instruction::new(
                opcode,
                "MOVW",
                vec![reg(d), reg(r)],
                1,
                Operation::MOVW { Rd: d as u8, Rr: r as u8 },
            ))
        }
        _ => Err(mismatch("movw", opcode)),
    }
}

#[bitmatch]
fn muls(opcode: u16) -> Result<Instruction> {
    #[bitmatch]
    match opcode {
        "0000_0010_dddd_rrrr" => {
            let (d, r) = (d + 16, r + 16);
            Ok(Instruction::new(
                opcode,
                "MULS",
                vec![reg(d), reg(r)],
                1,
                Operation::MULS { Rd: d as u8, Rr: r as u8 },
            ))
        }
        _ => Err(mismatch("muls", opcode)),
    }
}

#[bitmatch]
fn mov(opcode: u16) -> Result<Instruction> {
    #[bitmatch]
    match opcode {
        "0010_11rd_dddd_rrrr" => Ok(Instruction::new(
            opcode,
            "MOV",
            vec![reg(d), reg(r)],
            1,
            Operation::MOV { Rd: d as u8, Rr: r as u8 },
        )),
        _ => Err(mismatch("mov", opcode)),
    }
}

fn load(opcode: u16, d: u16, ptr: Pointer, mode: Mode, cycles: u8) -> Instruction {
    let verb = if let Mode::Displacement(_) = mode { "LDD" } else { "LD" };
    Instruction::new(
        opcode,
        verb,
        vec![reg(d), mode.format(ptr)],
        cycles,
        Operation::LD { Rd: d as u8, ptr, mode },
    )
}

fn store(opcode: u16, r: u16, ptr: Pointer, mode: Mode, cycles: u8) -> Instruction {
    let verb = if let Mode::Displacement(_) = mode { "STD" } else { "ST" };
    Instruction::new(
        opcode,
        verb,
        vec![mode.format(ptr), reg(r)],
        cycles,
        Operation::ST { Rr: r as u8, ptr, mode },
    )
}

fn transfer(opcode: u16, s: u16, r: u16, ptr: Pointer, mode: Mode, cycles: u8) -> Instruction {
    if s == 0 {
        load(opcode, r, ptr, mode, cycles)
    } else {
        store(opcode, r, ptr, mode, cycles)
    }
}

/// LD/ST through Y or Z with an optional displacement. Groups 0x8 and 0xA both
/// land here because bit 13 is part of `q`.
#[bitmatch]
fn displaced(opcode: u16) -> Result<Instruction> {
    #[bitmatch]
    match opcode {
        "10?0_??sd_dddd_y???" => {
            let ptr = if y == 1 { Pointer::Y } else { Pointer::Z };
            let q = displacement(opcode);
            if q == 0 {
                Ok(transfer(opcode, s, d, ptr, Mode::Plain, 1))
            } else {
                Ok(transfer(opcode, s, d, ptr, Mode::Displacement(q), 2))
            }
        }
        _ => Err(mismatch("displaced", opcode)),
    }
}

/// LD/ST through X, and the auto-increment/decrement forms for Y and Z.
#[bitmatch]
fn indirect(opcode: u16) -> Result<Instruction> {
    #[bitmatch]
    match opcode {
        "1001_00sd_dddd_0001" => Ok(transfer(opcode, s, d, Pointer::Z, Mode::PostInc, 1)),
        "1001_00sd_dddd_0010" => Ok(transfer(opcode, s, d, Pointer::Z, Mode::PreDec, 2)),
        "1001_00sd_dddd_1001" => Ok(transfer(opcode, s, d, Pointer::Y, Mode::PostInc, 1)),
        "1001_00sd_dddd_1010" => Ok(transfer(opcode, s, d, Pointer::Y, Mode::PreDec, 2)),
        "1001_00sd_dddd_1100" => Ok(transfer(opcode, s, d, Pointer::X, Mode::Plain, 1)),
        "1001_00sd_dddd_1101" => Ok(transfer(opcode, s, d, Pointer::X, Mode::PostInc, 1)),
        "1001_00sd_dddd_1110" => Ok(transfer(opcode, s, d, Pointer::X, Mode::PreDec, 2)),
        _ => Err(mismatch("indirect", opcode)),
    }
}

/// Two-word LDS/STS. The address word is fetched when the instruction runs.
#[bitmatch]
fn lds_sts(opcode: u16) -> Result<Instruction> {
    #[bitmatch]
    match opcode {
        "1001_000d_dddd_0000" => Ok(Instruction::new(
            opcode,
            "LDS",
            vec![reg(d), "k".to_string()],
            2,
            Operation::LDS { Rd: d as u8 },
        )
        .with_words(2)),
        "1001_001r_rrrr_0000" => Ok(Instruction::new(
            opcode,
            "STS",
            vec!["k".to_string(), reg(r)],
            2,
            Operation::STS { Rr: r as u8 },
        )
        .with_words(2)),
        _ => Err(mismatch("lds_sts", opcode)),
    }
}

#[bitmatch]
fn lpm(opcode: u16) -> Result<Instruction> {
    #[bitmatch]
    match opcode {
        "1001_0101_1100_1000" => Ok(Instruction::new(
            opcode,
            "LPM",
            vec![],
            3,
            Operation::LPM { Rd: 0, inc: false },
        )),
        "1001_000d_dddd_010i" => {
            let z = if i == 1 { "Z+" } else { "Z" };
            Ok(Instruction::new(
                opcode,
                "LPM",
                vec![reg(d), z.to_string()],
                3,
                Operation::LPM { Rd: d as u8, inc: i == 1 },
            ))
        }
        _ => Err(mismatch("lpm", opcode)),
    }
}

#[bitmatch]
fn pop_push(opcode: u16) -> Result<Instruction> {
    #[bitmatch]
    match opcode {
        "1001_000d_dddd_1111" => {
            Ok(Instruction::new(opcode, "POP", vec![reg(d)], 2, Operation::POP { Rd: d as u8 }))
        }
        "1001_001r_rrrr_1111" => {
            Ok(Instruction::new(opcode, "PUSH", vec![reg(r)], 2, Operation::PUSH { Rr: r as u8 }))
        }
        _ => Err(mismatch("pop_push", opcode)),
    }
}

#[bitmatch]
fn ldi(opcode: u16) -> Result<Instruction> {
    #[bitmatch]
    match opcode {
        "1110_kkkk_dddd_kkkk" => {
            let d = d + 16;
            Ok(Instruction::new(
                opcode,
                "LDI",
                vec![reg(d), format!("0x{:02X}", k)],
                1,
                Operation::LDI { Rd: d as u8, val: k as u8 },
            ))
        }
        _ => Err(mismatch("ldi", opcode)),
    }
}

#[bitmatch]
fn rjmp(opcode: u16) -> Result<Instruction> {
    #[bitmatch]
    match opcode {
        "1100_kkkk_kkkk_kkkk" => {
            // 12-bit two's complement
            let offset = ((k << 4) as i16) >> 4;
            Ok(Instruction::new(
                opcode,
                "RJMP",
                vec![format!("{:+}", offset)],
                2,
                Operation::RJMP { offset },
            ))
        }
        _ => Err(mismatch("rjmp", opcode)),
    }
}

//! Packed instruction encoding/decoding.
//!
//! A [`Bytecode`] is always either one byte (`(opcode << 4) | operand`, for
//! `operand < 16`) or two (an extended-prefix byte whose low nibble carries
//! the real opcode, followed by a full-width operand byte). `DoPrimitive`
//! and the branching `DoSpecial` variants additionally always carry one
//! more trailing full byte beyond the instruction itself, regardless of
//! whether the extended prefix fired — mirroring `original_source/src/
//! parser.c`'s `genInstruction`/`genCode` pair.

use std::fmt;

/// A constant pushable by `PushConstant` (opcode 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constant {
    /// Literal integer `0`.
    Zero,
    /// Literal integer `1`.
    One,
    /// Literal integer `2`.
    Two,
    /// Literal integer `-1`.
    MinusOne,
    /// `thisContext`.
    ThisContext,
    /// `nil`.
    Nil,
    /// `true`.
    True,
    /// `false`.
    False,
}

impl Constant {
    const fn operand(self) -> u8 {
        match self {
            Constant::Zero => 0,
            Constant::One => 1,
            Constant::Two => 2,
            Constant::MinusOne => 3,
            Constant::ThisContext => 4,
            Constant::Nil => 5,
            Constant::True => 6,
            Constant::False => 7,
        }
    }

    const fn from_operand(operand: u8) -> Option<Constant> {
        Some(match operand {
            0 => Constant::Zero,
            1 => Constant::One,
            2 => Constant::Two,
            3 => Constant::MinusOne,
            4 => Constant::ThisContext,
            5 => Constant::Nil,
            6 => Constant::True,
            7 => Constant::False,
            _ => return None,
        })
    }
}

/// A `DoSpecial` sub-operation (opcode 15).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Special {
    /// Return the receiver (argument 0) from the current method.
    SelfReturn,
    /// Return the top of the operand stack from the current method.
    StackReturn,
    /// Duplicate the top of the operand stack.
    Duplicate,
    /// Discard the top of the operand stack.
    PopTop,
    /// Unconditional jump to a 1-based byte offset.
    Branch(u8),
    /// Jump if the popped value is `true`.
    BranchIfTrue(u8),
    /// Jump if the popped value is `false`.
    BranchIfFalse(u8),
    /// Short-circuiting `and:`: jump (keeping `false` on the stack) if the
    /// popped value is `false`.
    AndBranch(u8),
    /// Short-circuiting `or:`: jump (keeping `true` on the stack) if the
    /// popped value is `true`.
    OrBranch(u8),
    /// Resume method lookup at the sending method's class's superclass.
    SendToSuper(u8),
}

impl Special {
    const fn low(self) -> u8 {
        match self {
            Special::SelfReturn => 1,
            Special::StackReturn => 2,
            Special::Duplicate => 4,
            Special::PopTop => 5,
            Special::Branch(_) => 6,
            Special::BranchIfTrue(_) => 7,
            Special::BranchIfFalse(_) => 8,
            Special::AndBranch(_) => 9,
            Special::OrBranch(_) => 10,
            Special::SendToSuper(_) => 11,
        }
    }

    /// True if this special carries a trailing operand byte (a branch
    /// target or a super-send's literal index).
    const fn has_trailing_byte(self) -> bool {
        matches!(
            self,
            Special::Branch(_)
                | Special::BranchIfTrue(_)
                | Special::BranchIfFalse(_)
                | Special::AndBranch(_)
                | Special::OrBranch(_)
                | Special::SendToSuper(_)
        )
    }
}

/// A single decoded bytecode instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bytecode {
    /// Push instance variable `field index`.
    PushInstance(u8),
    /// Push argument `index` (0 = self/receiver).
    PushArgument(u8),
    /// Push temporary `index`.
    PushTemporary(u8),
    /// Push literal pool entry `index`.
    PushLiteral(u8),
    /// Push a well-known constant.
    PushConstant(Constant),
    /// Pop the stack top into instance variable `field index`, leaving the
    /// value on the stack.
    AssignInstance(u8),
    /// Pop the stack top into temporary `index`, leaving the value on the
    /// stack.
    AssignTemporary(u8),
    /// Mark the arity (including receiver) of the message about to be sent.
    MarkArguments(u8),
    /// Send the selector at literal pool `index`.
    SendMessage(u8),
    /// Send the unary selector at fixed index `index` (`UNARY_SELECTORS`).
    SendUnary(u8),
    /// Send the binary selector at fixed index `index` (`BINARY_SELECTORS`).
    SendBinary(u8),
    /// Invoke host primitive `primitive`, taking `arg_count` arguments from
    /// the operand stack.
    DoPrimitive {
        /// Number of operand-stack arguments consumed.
        arg_count: u8,
        /// Primitive number.
        primitive: u8,
    },
    /// A `DoSpecial` sub-operation.
    DoSpecial(Special),
}

/// An error encountered while decoding a bytecode stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The stream ended mid-instruction.
    #[error("bytecode stream truncated at offset {0}")]
    Truncated(usize),
    /// The decoded high nibble (or extended operand) is not a known
    /// opcode.
    #[error("unknown opcode {0} at offset {1}")]
    UnknownOpcode(u8, usize),
    /// The decoded `DoSpecial` operand is not a known special.
    #[error("unknown special opcode {0} at offset {1}")]
    UnknownSpecial(u8, usize),
    /// The decoded `PushConstant` operand is not a known constant.
    #[error("unknown constant {0} at offset {1}")]
    UnknownConstant(u8, usize),
}

const OP_PUSH_INSTANCE: u8 = 1;
const OP_PUSH_ARGUMENT: u8 = 2;
const OP_PUSH_TEMPORARY: u8 = 3;
const OP_PUSH_LITERAL: u8 = 4;
const OP_PUSH_CONSTANT: u8 = 5;
const OP_ASSIGN_INSTANCE: u8 = 6;
const OP_ASSIGN_TEMPORARY: u8 = 7;
const OP_MARK_ARGUMENTS: u8 = 8;
const OP_SEND_MESSAGE: u8 = 9;
const OP_SEND_UNARY: u8 = 10;
const OP_SEND_BINARY: u8 = 11;
const OP_DO_PRIMITIVE: u8 = 13;
const OP_DO_SPECIAL: u8 = 15;

impl Bytecode {
    fn opcode_and_operand(self) -> (u8, u8) {
        match self {
            Bytecode::PushInstance(i) => (OP_PUSH_INSTANCE, i),
            Bytecode::PushArgument(i) => (OP_PUSH_ARGUMENT, i),
            Bytecode::PushTemporary(i) => (OP_PUSH_TEMPORARY, i),
            Bytecode::PushLiteral(i) => (OP_PUSH_LITERAL, i),
            Bytecode::PushConstant(c) => (OP_PUSH_CONSTANT, c.operand()),
            Bytecode::AssignInstance(i) => (OP_ASSIGN_INSTANCE, i),
            Bytecode::AssignTemporary(i) => (OP_ASSIGN_TEMPORARY, i),
            Bytecode::MarkArguments(i) => (OP_MARK_ARGUMENTS, i),
            Bytecode::SendMessage(i) => (OP_SEND_MESSAGE, i),
            Bytecode::SendUnary(i) => (OP_SEND_UNARY, i),
            Bytecode::SendBinary(i) => (OP_SEND_BINARY, i),
            Bytecode::DoPrimitive { arg_count, .. } => (OP_DO_PRIMITIVE, arg_count),
            Bytecode::DoSpecial(s) => (OP_DO_SPECIAL, s.low()),
        }
    }

    /// Append this instruction's encoding to `out`, returning the number of
    /// bytes written.
    pub fn encode(self, out: &mut Vec<u8>) -> usize {
        let start = out.len();
        let (opcode, operand) = self.opcode_and_operand();
        if operand < 16 {
            out.push((opcode << 4) | operand);
        } else {
            // Extended prefix: a plain byte equal to `opcode` (its high
            // nibble is implicitly 0), followed by the full operand byte.
            out.push(opcode);
            out.push(operand);
        }
        if let Bytecode::DoPrimitive { primitive, .. } = self {
            out.push(primitive);
        }
        if let Bytecode::DoSpecial(s) = self {
            if let Some(target) = s.trailing_byte() {
                out.push(target);
            }
        }
        out.len() - start
    }

    /// Decode one instruction starting at `bytes[offset]`, returning the
    /// instruction and the number of bytes it occupied.
    pub fn decode(bytes: &[u8], offset: usize) -> Result<(Bytecode, usize), DecodeError> {
        let mut cursor = offset;
        let byte = *bytes.get(cursor).ok_or(DecodeError::Truncated(cursor))?;
        cursor += 1;

        let (opcode, operand) = if byte >> 4 == 0 {
            let opcode = byte & 0x0F;
            let operand = *bytes.get(cursor).ok_or(DecodeError::Truncated(cursor))?;
            cursor += 1;
            (opcode, operand)
        } else {
            (byte >> 4, byte & 0x0F)
        };

        let bc = match opcode {
            OP_PUSH_INSTANCE => Bytecode::PushInstance(operand),
            OP_PUSH_ARGUMENT => Bytecode::PushArgument(operand),
            OP_PUSH_TEMPORARY => Bytecode::PushTemporary(operand),
            OP_PUSH_LITERAL => Bytecode::PushLiteral(operand),
            OP_PUSH_CONSTANT => Bytecode::PushConstant(
                Constant::from_operand(operand)
                    .ok_or(DecodeError::UnknownConstant(operand, offset))?,
            ),
            OP_ASSIGN_INSTANCE => Bytecode::AssignInstance(operand),
            OP_ASSIGN_TEMPORARY => Bytecode::AssignTemporary(operand),
            OP_MARK_ARGUMENTS => Bytecode::MarkArguments(operand),
            OP_SEND_MESSAGE => Bytecode::SendMessage(operand),
            OP_SEND_UNARY => Bytecode::SendUnary(operand),
            OP_SEND_BINARY => Bytecode::SendBinary(operand),
            OP_DO_PRIMITIVE => {
                let primitive = *bytes.get(cursor).ok_or(DecodeError::Truncated(cursor))?;
                cursor += 1;
                Bytecode::DoPrimitive {
                    arg_count: operand,
                    primitive,
                }
            }
            OP_DO_SPECIAL => {
                let special = decode_special(operand, offset)?;
                if special.has_trailing_byte() {
                    let target = *bytes.get(cursor).ok_or(DecodeError::Truncated(cursor))?;
                    cursor += 1;
                    Bytecode::DoSpecial(attach_trailing_byte(special, target))
                } else {
                    Bytecode::DoSpecial(special)
                }
            }
            other => return Err(DecodeError::UnknownOpcode(other, offset)),
        };

        Ok((bc, cursor - offset))
    }
}

impl Special {
    fn trailing_byte(self) -> Option<u8> {
        match self {
            Special::Branch(t)
            | Special::BranchIfTrue(t)
            | Special::BranchIfFalse(t)
            | Special::AndBranch(t)
            | Special::OrBranch(t)
            | Special::SendToSuper(t) => Some(t),
            _ => None,
        }
    }
}

fn decode_special(low: u8, offset: usize) -> Result<Special, DecodeError> {
    Ok(match low {
        1 => Special::SelfReturn,
        2 => Special::StackReturn,
        4 => Special::Duplicate,
        5 => Special::PopTop,
        6 => Special::Branch(0),
        7 => Special::BranchIfTrue(0),
        8 => Special::BranchIfFalse(0),
        9 => Special::AndBranch(0),
        10 => Special::OrBranch(0),
        11 => Special::SendToSuper(0),
        other => return Err(DecodeError::UnknownSpecial(other, offset)),
    })
}

fn attach_trailing_byte(special: Special, target: u8) -> Special {
    match special {
        Special::Branch(_) => Special::Branch(target),
        Special::BranchIfTrue(_) => Special::BranchIfTrue(target),
        Special::BranchIfFalse(_) => Special::BranchIfFalse(target),
        Special::AndBranch(_) => Special::AndBranch(target),
        Special::OrBranch(_) => Special::OrBranch(target),
        Special::SendToSuper(_) => Special::SendToSuper(target),
        other => other,
    }
}

impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(bc: Bytecode) {
        let mut buf = Vec::new();
        let written = bc.encode(&mut buf);
        assert_eq!(written, buf.len());
        let (decoded, consumed) = Bytecode::decode(&buf, 0).expect("decodes");
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, bc);
    }

    #[test]
    fn small_operand_fits_one_byte() {
        let mut buf = Vec::new();
        Bytecode::PushTemporary(3).encode(&mut buf);
        assert_eq!(buf, vec![0x33]);
    }

    #[test]
    fn large_operand_uses_extended_prefix() {
        let mut buf = Vec::new();
        Bytecode::PushLiteral(200).encode(&mut buf);
        assert_eq!(buf, vec![0x04, 200]);
        roundtrip(Bytecode::PushLiteral(200));
    }

    #[test]
    fn do_primitive_carries_trailing_byte() {
        let mut buf = Vec::new();
        Bytecode::DoPrimitive {
            arg_count: 2,
            primitive: 60,
        }
        .encode(&mut buf);
        assert_eq!(buf, vec![0xD2, 60]);
        roundtrip(Bytecode::DoPrimitive {
            arg_count: 2,
            primitive: 60,
        });
    }

    #[test]
    fn branch_special_carries_trailing_target() {
        let mut buf = Vec::new();
        Bytecode::DoSpecial(Special::Branch(250)).encode(&mut buf);
        assert_eq!(buf, vec![0xF6, 250]);
        roundtrip(Bytecode::DoSpecial(Special::Branch(250)));
    }

    #[test]
    fn self_return_is_a_single_byte() {
        let mut buf = Vec::new();
        Bytecode::DoSpecial(Special::SelfReturn).encode(&mut buf);
        assert_eq!(buf, vec![0xF1]);
        roundtrip(Bytecode::DoSpecial(Special::SelfReturn));
    }

    #[test]
    fn scenario_foo_returns_three_plus_four() {
        // `foo ^ 3 + 4`: two literal pushes, a binary send, then the
        // pop-top + self-return pair every non-void method body ends with.
        let mut buf = Vec::new();
        Bytecode::PushLiteral(0).encode(&mut buf);
        Bytecode::PushLiteral(1).encode(&mut buf);
        Bytecode::SendBinary(0).encode(&mut buf);
        Bytecode::DoSpecial(Special::PopTop).encode(&mut buf);
        Bytecode::DoSpecial(Special::SelfReturn).encode(&mut buf);
        assert_eq!(buf[buf.len() - 2..], [0xF5, 0xF1]);
    }

    #[test]
    fn truncated_stream_is_an_error() {
        assert_eq!(Bytecode::decode(&[], 0), Err(DecodeError::Truncated(0)));
        assert_eq!(
            Bytecode::decode(&[0x04], 0),
            Err(DecodeError::Truncated(1))
        );
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        // high nibble 12 and 14 are not assigned to any opcode.
        assert_eq!(
            Bytecode::decode(&[0xC0], 0),
            Err(DecodeError::UnknownOpcode(12, 0))
        );
    }
}

//! Recursive-descent parser and bytecode/literal-pool code generator
//! (grounded on `original_source/src/parser.c`).
//!
//! One [`Parser`] compiles exactly one method body: it owns the scratch
//! state `parser.c` keeps in file-scope statics (`codeArray`, `literalArray`,
//! `temporaryName`, ...) as ordinary fields instead, and reports the first
//! error it hits rather than limping on with `parseok` the way the original
//! does — the offending method is discarded either way.

use pebble_asm::{Bytecode, Constant, Special, BINARY_SELECTORS, UNARY_SELECTORS};
use pebble_types::Ref;

use crate::consts::method_limits;
use crate::constructors::Constructors;
use crate::error::CompileError;
use crate::lexer::{Lexer, Token};
use crate::memory::Memory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockStat {
    NotInBlock,
    InBlock,
    OptimizedBlock,
}

/// Everything accumulated while compiling one method: bytecode stream,
/// literal pool, and the name scopes `nameTerm`/`assignment` search.
pub(crate) struct Parser<'m> {
    lexer: Lexer,
    token: Token,
    memory: &'m mut Memory,
    constructors: &'m mut Constructors,
    instance_names: Vec<String>,
    temporary_names: Vec<String>,
    argument_names: Vec<String>,
    max_temporary: usize,
    code: Vec<u8>,
    literals: Vec<Ref>,
    pub(crate) selector: String,
    block_stat: BlockStat,
}

impl<'m> Parser<'m> {
    pub(crate) fn new(
        memory: &'m mut Memory,
        constructors: &'m mut Constructors,
        source: &str,
        instance_names: Vec<String>,
    ) -> Self {
        let mut lexer = Lexer::new(source);
        let token = lexer.next_token();
        Parser {
            lexer,
            token,
            memory,
            constructors,
            instance_names,
            temporary_names: Vec::new(),
            argument_names: Vec::new(),
            max_temporary: 0,
            code: Vec::new(),
            literals: Vec::new(),
            selector: String::new(),
            block_stat: BlockStat::NotInBlock,
        }
    }

    pub(crate) fn into_parts(self) -> (Vec<u8>, Vec<Ref>, usize, String) {
        (self.code, self.literals, self.max_temporary, self.selector)
    }

    /// Compile a full method: message pattern, temporaries, body, and the
    /// unconditional fall-through epilogue `parse()` always appends.
    pub(crate) fn parse_method(&mut self) -> Result<(), CompileError> {
        self.message_pattern()?;
        self.temporaries()?;
        self.body()?;
        self.gen(Bytecode::DoSpecial(Special::PopTop))?;
        self.gen(Bytecode::DoSpecial(Special::SelfReturn))?;
        Ok(())
    }

    fn advance(&mut self) {
        self.token = self.lexer.next_token();
    }

    fn err(&self, message: impl Into<String>) -> CompileError {
        CompileError::Syntax {
            context: if self.selector.is_empty() {
                "<pattern>".to_string()
            } else {
                self.selector.clone()
            },
            message: message.into(),
        }
    }

    fn token_is_binary(&self, s: &str) -> bool {
        matches!(&self.token, Token::Binary(t) if t == s)
    }

    fn token_is_namecolon(&self, s: &str) -> bool {
        matches!(&self.token, Token::NameColon(t) if t == s)
    }

    fn token_is_closing(&self, c: char) -> bool {
        matches!(self.token, Token::Closing(ch) if ch == c)
    }

    fn gen(&mut self, bc: Bytecode) -> Result<(), CompileError> {
        bc.encode(&mut self.code);
        if self.code.len() > method_limits::MAX_BYTECODES {
            return Err(CompileError::LimitExceeded {
                limit: "bytecode instructions",
                max: method_limits::MAX_BYTECODES,
            });
        }
        Ok(())
    }

    fn gen_literal(&mut self, lit: Ref) -> Result<u8, CompileError> {
        if self.literals.len() >= method_limits::MAX_LITERALS {
            return Err(CompileError::LimitExceeded {
                limit: "literals",
                max: method_limits::MAX_LITERALS,
            });
        }
        self.literals.push(lit);
        Ok((self.literals.len() - 1) as u8)
    }

    fn gen_integer(&mut self, value: i32) -> Result<(), CompileError> {
        match value {
            -1 => self.gen(Bytecode::PushConstant(Constant::MinusOne)),
            0 => self.gen(Bytecode::PushConstant(Constant::Zero)),
            1 => self.gen(Bytecode::PushConstant(Constant::One)),
            2 => self.gen(Bytecode::PushConstant(Constant::Two)),
            _ => {
                let tagged = Ref::small_int(value)
                    .ok_or_else(|| self.err("integer literal out of range"))?;
                let idx = self.gen_literal(tagged)?;
                self.gen(Bytecode::PushLiteral(idx))
            }
        }
    }

    fn new_symbol(&mut self, text: &str) -> Result<Ref, CompileError> {
        Ok(self.constructors.new_symbol(self.memory, text)?)
    }

    fn push_temp_limit(&mut self, name: String) -> Result<(), CompileError> {
        self.temporary_names.push(name);
        if self.temporary_names.len() > self.max_temporary {
            self.max_temporary = self.temporary_names.len();
        }
        if self.temporary_names.len() > method_limits::MAX_TEMPORARIES {
            return Err(CompileError::LimitExceeded {
                limit: "temporaries",
                max: method_limits::MAX_TEMPORARIES,
            });
        }
        Ok(())
    }

    /// `genMessage`: fold a unary/binary send into its fixed-table fast
    /// path when possible, else intern the selector and emit a full send.
    fn gen_message(&mut self, to_super: bool, arg_count: usize, selector: &str) -> Result<(), CompileError> {
        if !to_super && arg_count == 0 {
            if let Some(i) = UNARY_SELECTORS.iter().position(|s| *s == selector) {
                return self.gen(Bytecode::SendUnary(i as u8));
            }
        }
        if !to_super && arg_count == 1 {
            if let Some(i) = BINARY_SELECTORS.iter().position(|s| *s == selector) {
                return self.gen(Bytecode::SendBinary(i as u8));
            }
        }
        self.gen(Bytecode::MarkArguments((1 + arg_count) as u8))?;
        let sym = self.new_symbol(selector)?;
        let idx = self.gen_literal(sym)?;
        if to_super {
            self.gen(Bytecode::DoSpecial(Special::SendToSuper(idx)))
        } else {
            self.gen(Bytecode::SendMessage(idx))
        }
    }

    fn global_constant(name: &str) -> Option<Constant> {
        match name {
            "thisContext" => Some(Constant::ThisContext),
            "nil" => Some(Constant::Nil),
            "true" => Some(Constant::True),
            "false" => Some(Constant::False),
            _ => None,
        }
    }

    /// `nameTerm`: resolve a bare identifier in `self`/`super` > temporary
    /// (most recently declared first) > argument > instance variable >
    /// pseudo-global > deferred-runtime-global order. Returns whether the
    /// term was literally `super`.
    fn name_term(&mut self, name: &str) -> Result<bool, CompileError> {
        if name == "self" || name == "super" {
            self.gen(Bytecode::PushArgument(0))?;
            return Ok(name == "super");
        }
        if let Some(i) = self.temporary_names.iter().rposition(|n| n == name) {
            self.gen(Bytecode::PushTemporary(i as u8))?;
            return Ok(false);
        }
        if let Some(i) = self.argument_names.iter().position(|n| n == name) {
            self.gen(Bytecode::PushArgument((i + 1) as u8))?;
            return Ok(false);
        }
        if let Some(i) = self.instance_names.iter().position(|n| n == name) {
            self.gen(Bytecode::PushInstance(i as u8))?;
            return Ok(false);
        }
        if let Some(c) = Self::global_constant(name) {
            self.gen(Bytecode::PushConstant(c))?;
            return Ok(false);
        }
        // Not a known name in any local scope: compiled as a deferred
        // runtime global lookup, `<name> value`, not a compile error
        // (`original_source/src/parser.c`'s `nameTerm` fallback).
        let sym = self.new_symbol(name)?;
        let idx = self.gen_literal(sym)?;
        self.gen(Bytecode::PushLiteral(idx))?;
        self.gen_message(false, 0, "value")?;
        Ok(false)
    }

    /// `assignment`: resolve an assignment target the same way `nameTerm`
    /// resolves a read, minus arguments (which can never be assigned to),
    /// falling back to a runtime `self assign:value:` send.
    fn assignment(&mut self, name: &str) -> Result<(), CompileError> {
        if let Some(i) = self.temporary_names.iter().rposition(|n| n == name) {
            self.expression()?;
            return self.gen(Bytecode::AssignTemporary(i as u8));
        }
        if let Some(i) = self.instance_names.iter().position(|n| n == name) {
            self.expression()?;
            return self.gen(Bytecode::AssignInstance(i as u8));
        }
        self.gen(Bytecode::PushArgument(0))?;
        let sym = self.new_symbol(name)?;
        let idx = self.gen_literal(sym)?;
        self.gen(Bytecode::PushLiteral(idx))?;
        self.expression()?;
        self.gen_message(false, 2, "assign:value:")
    }

    /// `parseArray`: `#( ... )`. Elements are accumulated in a scratch
    /// buffer rather than the method's own literal pool so the array's
    /// contents never appear as separate top-level literals — only the
    /// finished `Array` object does.
    fn parse_array(&mut self) -> Result<u8, CompileError> {
        self.advance(); // consume '#(' / the nested '('
        let mut elements: Vec<Ref> = Vec::new();
        loop {
            if self.token_is_closing(')') {
                break;
            }
            match self.token.clone() {
                Token::InputEnd => return Err(self.err("unterminated literal array")),
                Token::ArrayBegin => {
                    let idx = self.parse_array()?;
                    elements.push(self.literals[idx as usize]);
                    self.literals.truncate(self.literals.len() - 1);
                }
                Token::Binary(op) if op == "(" => {
                    let idx = self.parse_array()?;
                    elements.push(self.literals[idx as usize]);
                    self.literals.truncate(self.literals.len() - 1);
                }
                Token::IntConst(v) => {
                    elements.push(
                        Ref::small_int(v).ok_or_else(|| self.err("integer literal out of range"))?,
                    );
                    self.advance();
                }
                Token::Binary(op) if op == "-" && self.lexer.peek().is_ascii_digit() => {
                    self.advance();
                    match self.token.clone() {
                        Token::IntConst(v) => {
                            elements.push(
                                Ref::small_int(-v)
                                    .ok_or_else(|| self.err("integer literal out of range"))?,
                            );
                            self.advance();
                        }
                        Token::FloatConst(v) => {
                            let obj = self.constructors.new_float(self.memory, -v)?;
                            elements.push(obj);
                            self.advance();
                        }
                        _ => return Err(self.err("'-' not followed by a number in literal array")),
                    }
                }
                Token::FloatConst(v) => {
                    let obj = self.constructors.new_float(self.memory, v)?;
                    elements.push(obj);
                    self.advance();
                }
                Token::NameConst(s) | Token::NameColon(s) | Token::SymConst(s) | Token::Binary(s) => {
                    let sym = self.new_symbol(&s)?;
                    elements.push(sym);
                    self.advance();
                }
                Token::CharConst(c) => {
                    let obj = self.constructors.new_char(self.memory, c as u32 as i32)?;
                    elements.push(obj);
                    self.advance();
                }
                Token::StrConst(s) => {
                    let obj = self.constructors.new_st_string(self.memory, &s)?;
                    elements.push(obj);
                    self.advance();
                }
                other => return Err(self.err(format!("illegal text in literal array: {other:?}"))),
            }
        }
        self.advance(); // consume ')'
        let array = self.constructors.new_array(self.memory, elements.len())?;
        for (i, value) in elements.iter().enumerate() {
            self.memory.store_pointer(array, i + 1, *value)?;
        }
        self.gen_literal(array)
    }

    /// `term`: one primary expression — everything that isn't itself a
    /// message send. Returns whether it was the bare identifier `super`.
    fn term(&mut self) -> Result<bool, CompileError> {
        match self.token.clone() {
            Token::NameConst(name) => {
                self.advance();
                self.name_term(&name)
            }
            Token::IntConst(v) => {
                self.gen_integer(v)?;
                self.advance();
                Ok(false)
            }
            Token::FloatConst(v) => {
                let obj = self.constructors.new_float(self.memory, v)?;
                let idx = self.gen_literal(obj)?;
                self.gen(Bytecode::PushLiteral(idx))?;
                self.advance();
                Ok(false)
            }
            Token::Binary(op) if op == "-" => {
                self.advance();
                match self.token.clone() {
                    Token::IntConst(v) => {
                        self.gen_integer(-v)?;
                        self.advance();
                    }
                    Token::FloatConst(v) => {
                        let obj = self.constructors.new_float(self.memory, -v)?;
                        let idx = self.gen_literal(obj)?;
                        self.gen(Bytecode::PushLiteral(idx))?;
                        self.advance();
                    }
                    _ => return Err(self.err("'-' not followed by a number")),
                }
                Ok(false)
            }
            Token::CharConst(c) => {
                let obj = self.constructors.new_char(self.memory, c as u32 as i32)?;
                let idx = self.gen_literal(obj)?;
                self.gen(Bytecode::PushLiteral(idx))?;
                self.advance();
                Ok(false)
            }
            Token::SymConst(s) => {
                let sym = self.new_symbol(&s)?;
                let idx = self.gen_literal(sym)?;
                self.gen(Bytecode::PushLiteral(idx))?;
                self.advance();
                Ok(false)
            }
            Token::StrConst(s) => {
                let obj = self.constructors.new_st_string(self.memory, &s)?;
                let idx = self.gen_literal(obj)?;
                self.gen(Bytecode::PushLiteral(idx))?;
                self.advance();
                Ok(false)
            }
            Token::ArrayBegin => {
                let idx = self.parse_array()?;
                self.gen(Bytecode::PushLiteral(idx))?;
                Ok(false)
            }
            Token::Binary(op) if op == "(" => {
                self.advance();
                self.expression()?;
                if !self.token_is_closing(')') {
                    return Err(self.err("missing right parenthesis"));
                }
                self.advance();
                Ok(false)
            }
            Token::Binary(op) if op == "<" => {
                self.parse_primitive()?;
                Ok(false)
            }
            Token::Binary(op) if op == "[" => {
                self.block()?;
                Ok(false)
            }
            other => Err(self.err(format!("invalid expression, unexpected {other:?}"))),
        }
    }

    /// `parsePrimitive`: `<` already consumed by the caller's dispatch.
    fn parse_primitive(&mut self) -> Result<(), CompileError> {
        self.advance(); // consume '<'
        let primitive = match self.token {
            Token::IntConst(v) if (0..=255).contains(&v) => v as u8,
            _ => return Err(self.err("primitive number missing or out of range")),
        };
        self.advance();
        let mut arg_count: u8 = 0;
        while !self.token_is_binary(">") {
            if matches!(self.token, Token::InputEnd) {
                return Err(self.err("unterminated primitive expression"));
            }
            self.term()?;
            arg_count += 1;
        }
        self.gen(Bytecode::DoPrimitive { arg_count, primitive })?;
        self.advance(); // consume '>'
        Ok(())
    }

    fn unary_continuation(&mut self, mut super_receiver: bool) -> Result<bool, CompileError> {
        while let Token::NameConst(name) = self.token.clone() {
            self.gen_message(super_receiver, 0, &name)?;
            super_receiver = false;
            self.advance();
        }
        Ok(super_receiver)
    }

    fn binary_continuation(&mut self, super_receiver: bool) -> Result<bool, CompileError> {
        let mut super_receiver = self.unary_continuation(super_receiver)?;
        while let Token::Binary(op) = self.token.clone() {
            self.advance();
            let rhs_super = self.term()?;
            self.unary_continuation(rhs_super)?;
            self.gen_message(super_receiver, 1, &op)?;
            super_receiver = false;
        }
        Ok(super_receiver)
    }

    /// `optimizeBlock`: emit a branch special with a placeholder trailing
    /// target, compile its argument (inlined if it's a literal block, or
    /// evaluated then sent `value` otherwise), and patch the branch to land
    /// just past what was emitted. Returns the patch location.
    fn optimize_block(
        &mut self,
        make_special: fn(u8) -> Special,
        pop_after_branch: bool,
    ) -> Result<usize, CompileError> {
        let save_bstat = self.block_stat;
        self.gen(Bytecode::DoSpecial(make_special(0)))?;
        let location = self.code.len() - 1;
        if pop_after_branch {
            self.gen(Bytecode::DoSpecial(Special::PopTop))?;
        }
        self.advance();
        if self.token_is_binary("[") {
            self.advance();
            if self.block_stat == BlockStat::NotInBlock {
                self.block_stat = BlockStat::OptimizedBlock;
            }
            self.body()?;
            if !self.token_is_closing(']') {
                return Err(self.err("optimized block not terminated by ]"));
            }
            self.advance();
        } else {
            let super_term = self.term()?;
            self.binary_continuation(super_term)?;
            self.gen_message(false, 0, "value")?;
        }
        self.code[location] = (self.code.len() + 1) as u8;
        self.block_stat = save_bstat;
        Ok(location)
    }

    /// `keyContinuation`: resolves the receiver via `binaryContinuation`
    /// first, then special-cases the five inlinable keyword sends before
    /// falling back to a generic keyword send.
    fn key_continuation(&mut self, super_receiver: bool) -> Result<bool, CompileError> {
        let mut super_receiver = self.binary_continuation(super_receiver)?;
        if let Token::NameColon(keyword) = self.token.clone() {
            if keyword == "ifTrue:" {
                let i = self.optimize_block(Special::BranchIfFalse, false)?;
                if self.token_is_namecolon("ifFalse:") {
                    self.code[i] = (self.code.len() + 3) as u8;
                    self.optimize_block(Special::Branch, true)?;
                }
            } else if keyword == "ifFalse:" {
                let i = self.optimize_block(Special::BranchIfTrue, false)?;
                if self.token_is_namecolon("ifTrue:") {
                    self.code[i] = (self.code.len() + 3) as u8;
                    self.optimize_block(Special::Branch, true)?;
                }
            } else if keyword == "whileTrue:" {
                let loop_top = self.code.len();
                self.gen(Bytecode::DoSpecial(Special::Duplicate))?;
                self.gen_message(false, 0, "value")?;
                let i = self.optimize_block(Special::BranchIfFalse, false)?;
                self.gen(Bytecode::DoSpecial(Special::PopTop))?;
                self.gen(Bytecode::DoSpecial(Special::Branch((loop_top + 1) as u8)))?;
                self.code[i] = (self.code.len() + 1) as u8;
                self.gen(Bytecode::DoSpecial(Special::PopTop))?;
            } else if keyword == "and:" {
                self.optimize_block(Special::AndBranch, false)?;
            } else if keyword == "or:" {
                self.optimize_block(Special::OrBranch, false)?;
            } else {
                let mut pattern = String::new();
                let mut arg_count = 0usize;
                while let Token::NameColon(kw) = self.token.clone() {
                    pattern.push_str(&kw);
                    arg_count += 1;
                    self.advance();
                    let arg_super = self.term()?;
                    self.binary_continuation(arg_super)?;
                }
                self.gen_message(super_receiver, arg_count, &pattern)?;
            }
            super_receiver = false;
        }
        Ok(super_receiver)
    }

    /// `continuation`: one primary send, then zero or more `;`-cascaded
    /// sends back to the same (duplicated) receiver.
    fn continuation(&mut self, super_receiver: bool) -> Result<(), CompileError> {
        self.key_continuation(super_receiver)?;
        while self.token_is_closing(';') {
            self.gen(Bytecode::DoSpecial(Special::Duplicate))?;
            self.advance();
            self.key_continuation(super_receiver)?;
            self.gen(Bytecode::DoSpecial(Special::PopTop))?;
        }
        Ok(())
    }

    /// `expression`: either an assignment (`name <- expression`) or a term
    /// plus its continuation.
    fn expression(&mut self) -> Result<(), CompileError> {
        if let Token::NameConst(name) = self.token.clone() {
            self.advance();
            if self.token_is_binary("<-") {
                self.advance();
                return self.assignment(&name);
            }
            let super_term = self.name_term(&name)?;
            return self.continuation(super_term);
        }
        let super_term = self.term()?;
        self.continuation(super_term)
    }

    /// `statement`: a `^`-return (with the block non-local-return fixup
    /// when compiling inside a real, non-optimized block) or a plain
    /// expression.
    fn statement(&mut self) -> Result<(), CompileError> {
        if self.token_is_binary("^") {
            self.advance();
            self.expression()?;
            if self.block_stat == BlockStat::InBlock {
                self.gen(Bytecode::PushConstant(Constant::ThisContext))?;
                self.gen_message(false, 0, "blockReturn")?;
                self.gen(Bytecode::DoSpecial(Special::PopTop))?;
            }
            self.gen(Bytecode::DoSpecial(Special::StackReturn))
        } else {
            self.expression()
        }
    }

    /// `body`: a `.`-separated statement sequence. An empty block body
    /// (`[ ]`) evaluates to `nil` without entering the statement loop at
    /// all. The final statement's value is left on the stack for the
    /// caller's epilogue to consume.
    fn body(&mut self) -> Result<(), CompileError> {
        if matches!(self.block_stat, BlockStat::InBlock | BlockStat::OptimizedBlock)
            && self.token_is_closing(']')
        {
            return self.gen(Bytecode::PushConstant(Constant::Nil));
        }
        loop {
            self.statement()?;
            match self.token.clone() {
                Token::Closing(c) if c == '.' => {
                    self.advance();
                    if matches!(self.token, Token::InputEnd) {
                        break;
                    }
                    self.gen(Bytecode::DoSpecial(Special::PopTop))?;
                }
                Token::Closing(_) => break,
                Token::InputEnd => break,
                other => return Err(self.err(format!("invalid statement ending at {other:?}"))),
            }
        }
        Ok(())
    }

    /// `block`: `[` already consumed. Compiles colon-argument names (shared
    /// temporary-index space with the enclosing method), then either
    /// constructs a `Block` object bound to the current context and
    /// branches past the inlined body, or — when called from
    /// `optimize_block` — the body is inlined directly by the caller
    /// instead of going through here at all.
    fn block(&mut self) -> Result<(), CompileError> {
        let save_temporary = self.temporary_names.len();
        let save_bstat = self.block_stat;
        let mut arg_count = 0usize;
        self.advance(); // consume '['
        if self.token_is_binary(":") {
            while self.token_is_binary(":") {
                self.advance();
                let name = match self.token.clone() {
                    Token::NameConst(n) => n,
                    _ => return Err(self.err("name must follow ':' in block argument list")),
                };
                self.push_temp_limit(name)?;
                arg_count += 1;
                self.advance();
            }
            if !self.token_is_binary("|") {
                return Err(self.err("block argument list must be terminated by '|'"));
            }
            self.advance();
        }

        let new_block = self.constructors.new_block(self.memory)?;
        let arg_count_ref = Ref::small_int(arg_count as i32).unwrap();
        self.memory
            .store_pointer(new_block, crate::consts::block_fields::ARGUMENT_COUNT, arg_count_ref)?;
        let arg_loc = Ref::small_int((save_temporary + 1) as i32).unwrap();
        self.memory
            .store_pointer(new_block, crate::consts::block_fields::ARGUMENT_LOCATION, arg_loc)?;

        let blk_lit = self.gen_literal(new_block)?;
        self.gen(Bytecode::PushLiteral(blk_lit))?;
        self.gen(Bytecode::PushConstant(Constant::ThisContext))?;
        self.gen(Bytecode::DoPrimitive {
            arg_count: 2,
            primitive: pebble_asm::Primitive::BLOCK_CREATE.0,
        })?;
        self.gen(Bytecode::DoSpecial(Special::Branch(0)))?;
        let fix_location = self.code.len() - 1;

        let bytecode_offset = Ref::small_int((self.code.len() + 1) as i32).unwrap();
        self.memory
            .store_pointer(new_block, crate::consts::block_fields::BYTECODE_OFFSET, bytecode_offset)?;

        self.block_stat = BlockStat::InBlock;
        self.body()?;
        if !self.token_is_closing(']') {
            return Err(self.err("block not terminated by ']'"));
        }
        self.advance();
        self.gen(Bytecode::DoSpecial(Special::StackReturn))?;
        self.code[fix_location] = (self.code.len() + 1) as u8;

        self.temporary_names.truncate(save_temporary);
        self.block_stat = save_bstat;
        Ok(())
    }

    fn temporaries(&mut self) -> Result<(), CompileError> {
        if !self.token_is_binary("|") {
            return Ok(());
        }
        self.advance();
        while let Token::NameConst(name) = self.token.clone() {
            self.push_temp_limit(name)?;
            self.advance();
        }
        if !self.token_is_binary("|") {
            return Err(self.err("temporary variable list not terminated by '|'"));
        }
        self.advance();
        Ok(())
    }

    /// `messagePattern`: unary, binary, or keyword message pattern, setting
    /// `self.selector` and populating `argument_names`.
    fn message_pattern(&mut self) -> Result<(), CompileError> {
        match self.token.clone() {
            Token::NameConst(name) => {
                self.selector = name;
                self.advance();
            }
            Token::Binary(op) => {
                self.selector = op;
                self.advance();
                match self.token.clone() {
                    Token::NameConst(arg) => {
                        self.argument_names.push(arg);
                        self.advance();
                    }
                    _ => return Err(self.err("binary message pattern not followed by a name")),
                }
            }
            Token::NameColon(_) => {
                let mut selector = String::new();
                while let Token::NameColon(keyword) = self.token.clone() {
                    selector.push_str(&keyword);
                    self.advance();
                    let arg = match self.token.clone() {
                        Token::NameConst(a) => a,
                        _ => return Err(self.err("keyword message pattern not followed by a name")),
                    };
                    if self.argument_names.len() >= method_limits::MAX_ARGUMENTS {
                        return Err(CompileError::LimitExceeded {
                            limit: "arguments",
                            max: method_limits::MAX_ARGUMENTS,
                        });
                    }
                    self.argument_names.push(arg);
                    self.advance();
                }
                self.selector = selector;
            }
            other => return Err(self.err(format!("illegal message selector: {other:?}"))),
        }
        Ok(())
    }
}

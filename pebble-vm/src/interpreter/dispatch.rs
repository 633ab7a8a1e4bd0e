//! The fetch/decode/dispatch loop and message send.
//!
//! Everything here operates through a single shared resource: a process's
//! one operand-stack array, addressed by its `STACK_TOP` field. Pushing and
//! popping always go through [`Interpreter::push`]/[`Interpreter::pop`],
//! which additionally nil out a vacated slot so the object it held is
//! properly decremented — the reference-count invariant holds at every
//! bytecode boundary, not just at image-write time.

use pebble_asm::{Bytecode, Constant, Primitive, Special};
use pebble_types::Ref;
use tracing::trace;

use crate::consts::{
    block_fields, context_fields, method_fields, process_fields, LINKAGE_HEADER_SIZE,
    RUNAWAY_STACK_THRESHOLD, STACK_GROWTH_CUSHION,
};
use crate::error::InterpreterError;
use crate::primitive::PrimitiveContext;

use super::frame::Frame;
use super::send;
use super::Interpreter;

impl Interpreter {
    /// The process's stack array.
    pub(crate) fn stack_obj(&self, process: Ref) -> Result<Ref, InterpreterError> {
        Ok(self.memory.fetch_pointer(process, process_fields::STACK)?)
    }

    /// The process's current operand-stack-top index.
    pub(crate) fn stack_top(&self, process: Ref) -> Result<i32, InterpreterError> {
        let top = self.memory.fetch_pointer(process, process_fields::STACK_TOP)?;
        Ok(top.as_small_int().unwrap_or(0))
    }

    fn set_stack_top(&mut self, process: Ref, top: i32) -> Result<(), InterpreterError> {
        let tagged = Ref::small_int(top).ok_or_else(|| {
            InterpreterError::fatal("stack overflow", format!("stack top {top} not representable"))
        })?;
        self.memory.store_pointer(process, process_fields::STACK_TOP, tagged)?;
        Ok(())
    }

    /// Grow `process`'s stack to hold at least `needed` slots (1-based),
    /// copying everything already live and leaving the rest `nil`, as
    /// necessary to fit the about-to-be-installed frame.
    fn grow_stack(&mut self, process: Ref, needed: usize) -> Result<(), InterpreterError> {
        let stack = self.stack_obj(process)?;
        let cur_len = self.memory.size_of(stack)?.max(0) as usize;
        if needed <= cur_len {
            return Ok(());
        }
        let new_len = needed + STACK_GROWTH_CUSHION;
        trace!(cur_len, new_len, "growing process stack");
        let new_stack = self.constructors.new_array(&mut self.memory, new_len)?;
        for i in 1..=cur_len {
            let v = self.memory.fetch_pointer(stack, i)?;
            self.memory.store_pointer(new_stack, i, v)?;
        }
        self.memory.store_pointer(process, process_fields::STACK, new_stack)?;
        Ok(())
    }

    /// Push `value` onto `process`'s operand stack, growing it first if
    /// necessary.
    pub(crate) fn push(&mut self, process: Ref, value: Ref) -> Result<(), InterpreterError> {
        let top = self.stack_top(process)?;
        let new_top = top + 1;
        self.grow_stack(process, new_top as usize)?;
        let stack = self.stack_obj(process)?;
        self.memory.store_pointer(stack, new_top as usize, value)?;
        self.set_stack_top(process, new_top)?;
        Ok(())
    }

    /// Pop and return the top of `process`'s operand stack, nil-ing the
    /// vacated slot so the popped value's reference count is released if
    /// nothing else holds it.
    fn pop(&mut self, process: Ref) -> Result<Ref, InterpreterError> {
        let stack = self.stack_obj(process)?;
        let top = self.stack_top(process)?;
        if top < 1 {
            return Err(InterpreterError::fatal("stack underflow", "popped an empty operand stack"));
        }
        let value = self.memory.fetch_pointer(stack, top as usize)?;
        self.memory.store_pointer(stack, top as usize, Ref::NIL)?;
        self.set_stack_top(process, top - 1)?;
        Ok(value)
    }

    /// Pop `n` values off `process`'s operand stack, in push order (the
    /// first pushed is `args[0]`).
    fn pop_n(&mut self, process: Ref, n: usize) -> Result<Vec<Ref>, InterpreterError> {
        let mut args = vec![Ref::NIL; n];
        for i in (0..n).rev() {
            args[i] = self.pop(process)?;
        }
        Ok(args)
    }

    /// Read (without removing) the top of `process`'s operand stack.
    fn peek(&self, process: Ref) -> Result<Ref, InterpreterError> {
        let stack = self.stack_obj(process)?;
        let top = self.stack_top(process)?;
        Ok(self.memory.fetch_pointer(stack, top as usize)?)
    }

    /// Release every slot in `(to, from]`, decrementing whatever each held
    /// (the discarded frame's arguments, linkage header, and temporaries
    /// must not leak a reference).
    fn release_range(&mut self, process: Ref, from: i32, to: i32) -> Result<(), InterpreterError> {
        let stack = self.stack_obj(process)?;
        let mut i = from;
        while i > to {
            self.memory.store_pointer(stack, i as usize, Ref::NIL)?;
            i -= 1;
        }
        Ok(())
    }

    fn bool_ref(&self, value: bool) -> Ref {
        if value {
            self.true_obj
        } else {
            self.false_obj
        }
    }

    fn primitive_ctx(&mut self) -> PrimitiveContext<'_> {
        PrimitiveContext {
            memory: &mut self.memory,
            constructors: &mut self.constructors,
            symbols: self.symbols,
            io: &mut self.io,
            watching: &mut self.watching,
            true_obj: self.true_obj,
            false_obj: self.false_obj,
            cache: &mut self.cache,
        }
    }

    /// Push `receiver` and activate `method` directly, bypassing method
    /// lookup entirely — the one-off "do it" path a top-level expression or
    /// the image-builder's file-in driver takes, since neither has a
    /// selector to look up.
    pub(crate) fn activate_compiled(
        &mut self,
        process: Ref,
        method: Ref,
        receiver: Ref,
    ) -> Result<(), InterpreterError> {
        self.push(process, receiver)?;
        let top = self.stack_top(process)?;
        self.activate(process, method, top as usize, 1)
    }

    /// Install a brand new stack-resident frame atop `args_base`'s
    /// already-pushed receiver/arguments, then jump to byte offset 1
    /// before the first bytecode of the callee ever runs.
    fn activate(
        &mut self,
        process: Ref,
        method: Ref,
        args_base: usize,
        arg_count: usize,
    ) -> Result<(), InterpreterError> {
        let stack_size = self
            .memory
            .fetch_pointer(method, method_fields::STACK_SIZE)?
            .as_small_int()
            .unwrap_or(6)
            .max(0) as usize;
        let temp_size = self
            .memory
            .fetch_pointer(method, method_fields::TEMPORARY_SIZE)?
            .as_small_int()
            .unwrap_or(0)
            .max(0) as usize;

        let link_pointer = args_base + arg_count;
        let needed = link_pointer + LINKAGE_HEADER_SIZE + temp_size + stack_size;
        self.grow_stack(process, needed)?;

        let stack = self.stack_obj(process)?;
        let prev_link = self.memory.fetch_pointer(process, process_fields::LINK_PTR)?;
        let args_base_tagged = Ref::small_int(args_base as i32)
            .ok_or_else(|| InterpreterError::fatal("method call", "argument base not representable"))?;
        let byte_offset_tagged = Ref::small_int(1).expect("1 is representable");

        self.memory.store_pointer(stack, link_pointer, prev_link)?;
        self.memory.store_pointer(stack, link_pointer + 1, Ref::NIL)?;
        self.memory.store_pointer(stack, link_pointer + 2, args_base_tagged)?;
        self.memory.store_pointer(stack, link_pointer + 3, method)?;
        self.memory.store_pointer(stack, link_pointer + 4, byte_offset_tagged)?;
        for i in 0..temp_size {
            self.memory.store_pointer(stack, link_pointer + LINKAGE_HEADER_SIZE + i, Ref::NIL)?;
        }

        let new_link = Ref::small_int(link_pointer as i32)
            .ok_or_else(|| InterpreterError::fatal("method call", "link pointer not representable"))?;
        self.memory.store_pointer(process, process_fields::LINK_PTR, new_link)?;
        let new_top = link_pointer + LINKAGE_HEADER_SIZE + temp_size;
        self.set_stack_top(process, new_top as i32 - 1)?;
        Ok(())
    }

    /// Activate a `Block`: share the enclosing activation's arguments and
    /// temporaries rather than allocating fresh ones, so writes inside the
    /// block are visible in its enclosing scope after it returns.
    fn activate_block(
        &mut self,
        process: Ref,
        block: Ref,
        args_base: usize,
        arg_count: usize,
    ) -> Result<(), InterpreterError> {
        let stack = self.stack_obj(process)?;
        let passed_args = arg_count - 1;
        let declared_args = self
            .memory
            .fetch_pointer(block, block_fields::ARGUMENT_COUNT)?
            .as_small_int()
            .unwrap_or(0)
            .max(0) as usize;
        if passed_args != declared_args {
            return Err(InterpreterError::fatal(
                "wrong argument count",
                format!("block expects {declared_args} argument(s), got {passed_args}"),
            ));
        }

        let home_context = self.memory.fetch_pointer(block, block_fields::CONTEXT)?;
        let arg_location = self
            .memory
            .fetch_pointer(block, block_fields::ARGUMENT_LOCATION)?
            .as_small_int()
            .unwrap_or(1)
            .max(1) as usize;
        let bytecode_offset = self
            .memory
            .fetch_pointer(block, block_fields::BYTECODE_OFFSET)?
            .as_small_int()
            .unwrap_or(1);
        let home_method = self.memory.fetch_pointer(home_context, context_fields::METHOD)?;
        let home_args = self.memory.fetch_pointer(home_context, context_fields::ARGUMENTS)?;
        let home_temps = self.memory.fetch_pointer(home_context, context_fields::TEMPORARIES)?;

        for i in 0..passed_args {
            let v = self.memory.fetch_pointer(stack, args_base + 1 + i)?;
            self.memory.store_pointer(home_temps, arg_location + i, v)?;
        }

        // A block nested inside another block inherits its creating
        // context's own non-local-return home rather than that context
        // itself, so `^` always unwinds to the outermost method activation
        // regardless of block nesting depth.
        let outer_home = self.memory.fetch_pointer(home_context, context_fields::HOME)?;
        let non_local_home = if outer_home.is_nil() { home_context } else { outer_home };

        let caller_link = self.memory.fetch_pointer(process, process_fields::LINK_PTR)?;
        let new_context = self.constructors.new_context(
            &mut self.memory,
            caller_link,
            home_method,
            home_args,
            home_temps,
            bytecode_offset,
            args_base as i32,
            non_local_home,
        )?;
        self.memory.store_pointer(process, process_fields::LINK_PTR, new_context)?;
        self.release_range(process, (args_base + arg_count) as i32 - 1, args_base as i32 - 1)?;
        self.set_stack_top(process, args_base as i32 - 1)?;
        Ok(())
    }

    /// Return `value` from the process's current frame, resuming its
    /// caller — or finishing the process, if there is none. Returns
    /// `true` if the process still has work to do.
    fn do_return(&mut self, process: Ref, value: Ref) -> Result<bool, InterpreterError> {
        let stack = self.stack_obj(process)?;
        let link = self.memory.fetch_pointer(process, process_fields::LINK_PTR)?;
        let Some(frame) = Frame::resolve_active(&self.memory, stack, link)? else {
            return Err(InterpreterError::fatal("return", "no active frame to return from"));
        };
        let prev_link = frame.prev_link(&self.memory, stack)?;
        let return_point = frame.return_point(&self.memory, stack)?;
        let old_top = self.stack_top(process)?;

        self.memory.store_pointer(stack, return_point as usize, value)?;
        self.release_range(process, old_top, return_point)?;
        self.set_stack_top(process, return_point)?;
        self.memory.store_pointer(process, process_fields::LINK_PTR, prev_link)?;
        Ok(!prev_link.is_nil())
    }

    /// `blockReturn`: unwind directly to the block's home method
    /// activation with `value`, skipping over however many block-call
    /// frames are active above it (`compiler::parser`'s `^`-inside-a-block
    /// codegen).
    fn do_block_return(&mut self, process: Ref, block_context: Ref, value: Ref) -> Result<bool, InterpreterError> {
        let home = self.memory.fetch_pointer(block_context, context_fields::HOME)?;
        let home = if home.is_nil() { block_context } else { home };
        let stack = self.stack_obj(process)?;
        let prev_link = self.memory.fetch_pointer(home, context_fields::LINK_PTR)?;
        let return_point = self
            .memory
            .fetch_pointer(home, context_fields::RETURN_POINT)?
            .as_small_int()
            .unwrap_or(1);
        let old_top = self.stack_top(process)?;

        self.memory.store_pointer(stack, return_point as usize, value)?;
        self.release_range(process, old_top, return_point)?;
        self.set_stack_top(process, return_point)?;
        self.memory.store_pointer(process, process_fields::LINK_PTR, prev_link)?;
        Ok(!prev_link.is_nil())
    }

    /// Rewrite the operand stack into `[receiver, selector, argumentsArray]`
    /// and retry as `message:notRecognizedWithArguments:`. A second miss
    /// (the recovery selector itself going unrecognized) is fatal.
    fn not_understood(
        &mut self,
        process: Ref,
        args_base: usize,
        arg_count: usize,
        selector: Ref,
    ) -> Result<(), InterpreterError> {
        if selector == self.mnu_selector {
            return Err(InterpreterError::fatal(
                "doesNotUnderstand",
                "message:notRecognizedWithArguments: itself has no method",
            ));
        }
        let stack = self.stack_obj(process)?;
        let args_array = self
            .constructors
            .copy_from(&mut self.memory, stack, args_base + 1, arg_count - 1)?;
        for i in 1..arg_count {
            self.memory.store_pointer(stack, args_base + i, Ref::NIL)?;
        }
        self.memory.store_pointer(stack, args_base + 1, selector)?;
        self.memory.store_pointer(stack, args_base + 2, args_array)?;
        self.set_stack_top(process, (args_base + 2) as i32)?;
        self.perform_send(process, args_base, 3, self.mnu_selector, false, Ref::NIL)
    }

    /// Re-dispatch a watched method's send as `watchWith:`, passing the
    /// original selector as its sole argument (the `<5 toggleWatch>`
    /// primitive).
    fn dispatch_watch(
        &mut self,
        process: Ref,
        args_base: usize,
        arg_count: usize,
        original_selector: Ref,
    ) -> Result<(), InterpreterError> {
        let watch_selector = self.constructors.new_symbol(&mut self.memory, "watchWith:")?;
        let stack = self.stack_obj(process)?;
        for i in 1..arg_count {
            self.memory.store_pointer(stack, args_base + i, Ref::NIL)?;
        }
        self.memory.store_pointer(stack, args_base + 1, original_selector)?;
        self.set_stack_top(process, (args_base + 1) as i32)?;
        self.perform_send(process, args_base, 2, watch_selector, false, Ref::NIL)
    }

    /// Send `selector` to whatever's sitting at `args_base` (the receiver),
    /// with `arg_count` total operand-stack slots (receiver included).
    ///
    /// `to_super` resumes lookup at `owning_class`'s superclass rather than
    /// the receiver's own class.
    pub(crate) fn perform_send(
        &mut self,
        process: Ref,
        args_base: usize,
        arg_count: usize,
        selector: Ref,
        to_super: bool,
        owning_class: Ref,
    ) -> Result<(), InterpreterError> {
        let stack = self.stack_obj(process)?;
        let receiver = self.memory.fetch_pointer(stack, args_base)?;

        if !to_super && selector == self.block_return_selector {
            let value = self.peek_below_receiver(process, args_base)?;
            // `blockReturn`'s own send leaves no result on the stack for the
            // caller to pop: `do_block_return` already placed the real
            // return value and rewound to the home frame, so nothing further
            // for this send to do.
            self.do_block_return(process, receiver, value)?;
            return Ok(());
        }

        if !to_super && self.block_value_selectors.contains(&selector) {
            let block_class = self.constructors.block_class(&self.memory)?;
            let receiver_class = self.constructors.get_class(&mut self.memory, receiver)?;
            if receiver_class == block_class {
                return self.activate_block(process, receiver, args_base, arg_count);
            }
        }

        let lookup_class = if to_super {
            send::super_lookup_class(&self.memory, owning_class)?
        } else {
            self.constructors.get_class(&mut self.memory, receiver)?
        };

        let resolved = self.cache.probe(selector, lookup_class);
        let resolved = match resolved {
            Some(found) => Some(found),
            None => match send::find_method(&self.memory, lookup_class, selector)? {
                Some((defining_class, method)) => {
                    self.cache.install(selector, lookup_class, defining_class, method);
                    Some((defining_class, method))
                }
                None => None,
            },
        };

        let Some((_, method)) = resolved else {
            return self.not_understood(process, args_base, arg_count, selector);
        };

        let watch = self.memory.fetch_pointer(method, method_fields::WATCH)?;
        if self.watching && !watch.is_nil() {
            return self.dispatch_watch(process, args_base, arg_count, selector);
        }
        self.activate(process, method, args_base, arg_count)
    }

    /// `blockReturn` is always sent with no explicit argument — the value
    /// being non-locally returned is whatever the compiler left sitting
    /// just below `thisContext` on the operand stack (`compiler::parser`'s
    /// `^`-inside-a-block codegen: push expr, push `thisContext`, send
    /// `blockReturn`).
    fn peek_below_receiver(&self, process: Ref, args_base: usize) -> Result<Ref, InterpreterError> {
        let stack = self.stack_obj(process)?;
        Ok(self.memory.fetch_pointer(stack, args_base - 1)?)
    }

    /// Run `process` for up to `quantum` bytecodes, or until it returns
    /// from its outermost frame. Returns `true` if the process still has
    /// an active frame (the caller should call `execute` again to
    /// continue), `false` once it has finished.
    #[tracing::instrument(skip(self), fields(process = ?process))]
    pub(crate) fn execute(&mut self, process: Ref, quantum: u32) -> Result<bool, InterpreterError> {
        let mut steps_left = quantum;
        loop {
            let stack = self.stack_obj(process)?;
            let stack_len = self.memory.size_of(stack)?.max(0) as usize;
            if stack_len > RUNAWAY_STACK_THRESHOLD {
                steps_left = 0;
            }
            if steps_left == 0 {
                return Ok(true);
            }

            let link = self.memory.fetch_pointer(process, process_fields::LINK_PTR)?;
            let Some(frame) = Frame::resolve_active(&self.memory, stack, link)? else {
                return Ok(false);
            };

            let method = frame.method(&self.memory, stack)?;
            let bytecodes_obj = self.memory.fetch_pointer(method, method_fields::BYTECODES)?;
            let code: Vec<u8> = self.memory.bytes(bytecodes_obj)?.to_vec();
            let offset = frame.byte_offset(&self.memory, stack)? as usize;
            if offset == 0 || offset > code.len() {
                return Err(InterpreterError::fatal("bytecode fault", "byte offset out of range"));
            }

            let (bc, used) = Bytecode::decode(&code, offset - 1)
                .map_err(|e| InterpreterError::fatal("bytecode fault", e.to_string()))?;
            frame.set_byte_offset(&mut self.memory, stack, (offset + used) as i32)?;
            trace!(?bc, offset, "dispatch");

            let mut sent = false;
            match bc {
                Bytecode::PushInstance(i) => {
                    let self_obj = frame.argument(&self.memory, stack, 0)?;
                    let v = self.memory.fetch_pointer(self_obj, i as usize + 1)?;
                    self.push(process, v)?;
                }
                Bytecode::PushArgument(i) => {
                    let v = frame.argument(&self.memory, stack, i as usize)?;
                    self.push(process, v)?;
                }
                Bytecode::PushTemporary(i) => {
                    let v = frame.temporary(&self.memory, stack, i as usize)?;
                    self.push(process, v)?;
                }
                Bytecode::PushLiteral(i) => {
                    let literals = self.memory.fetch_pointer(method, method_fields::LITERALS)?;
                    let v = self.memory.fetch_pointer(literals, i as usize + 1)?;
                    self.push(process, v)?;
                }
                Bytecode::PushConstant(c) => {
                    let v = match c {
                        Constant::Zero => Ref::small_int(0).expect("0 is representable"),
                        Constant::One => Ref::small_int(1).expect("1 is representable"),
                        Constant::Two => Ref::small_int(2).expect("2 is representable"),
                        Constant::MinusOne => Ref::small_int(-1).expect("-1 is representable"),
                        Constant::ThisContext => frame.reify(&mut self.memory, &mut self.constructors, stack)?,
                        Constant::Nil => Ref::NIL,
                        Constant::True => self.true_obj,
                        Constant::False => self.false_obj,
                    };
                    self.push(process, v)?;
                }
                Bytecode::AssignInstance(i) => {
                    let self_obj = frame.argument(&self.memory, stack, 0)?;
                    let v = self.peek(process)?;
                    self.memory.store_pointer(self_obj, i as usize + 1, v)?;
                }
                Bytecode::AssignTemporary(i) => {
                    let v = self.peek(process)?;
                    frame.set_temporary(&mut self.memory, stack, i as usize, v)?;
                }
                Bytecode::MarkArguments(n) => {
                    let (bc2, used2) = Bytecode::decode(&code, offset - 1 + used)
                        .map_err(|e| InterpreterError::fatal("bytecode fault", e.to_string()))?;
                    frame.set_byte_offset(&mut self.memory, stack, (offset + used + used2) as i32)?;
                    let arg_count = n as usize;
                    let top = self.stack_top(process)?;
                    let args_base = top as usize - arg_count + 1;
                    match bc2 {
                        Bytecode::SendMessage(idx) => {
                            let literals = self.memory.fetch_pointer(method, method_fields::LITERALS)?;
                            let selector = self.memory.fetch_pointer(literals, idx as usize + 1)?;
                            self.perform_send(process, args_base, arg_count, selector, false, Ref::NIL)?;
                        }
                        Bytecode::DoSpecial(Special::SendToSuper(idx)) => {
                            let owning_class = self.memory.fetch_pointer(method, method_fields::METHOD_CLASS)?;
                            let literals = self.memory.fetch_pointer(method, method_fields::LITERALS)?;
                            let selector = self.memory.fetch_pointer(literals, idx as usize + 1)?;
                            self.perform_send(process, args_base, arg_count, selector, true, owning_class)?;
                        }
                        other => {
                            return Err(InterpreterError::fatal(
                                "bytecode fault",
                                format!("MarkArguments must be followed by a send, found {other:?}"),
                            ))
                        }
                    }
                    sent = true;
                }
                Bytecode::SendMessage(idx) => {
                    // Reachable only for a 0-argument generic send with no
                    // preceding `MarkArguments` (none of this crate's own
                    // codegen emits that shape, but a hand-assembled or
                    // file-in-compiled method could); arity is exactly the
                    // receiver alone.
                    let literals = self.memory.fetch_pointer(method, method_fields::LITERALS)?;
                    let selector = self.memory.fetch_pointer(literals, idx as usize + 1)?;
                    let top = self.stack_top(process)?;
                    self.perform_send(process, top as usize, 1, selector, false, Ref::NIL)?;
                    sent = true;
                }
                Bytecode::SendUnary(idx) => {
                    let top = self.stack_top(process)?;
                    match idx {
                        0 => {
                            let receiver = self.peek(process)?;
                            let v = self.bool_ref(receiver.is_nil());
                            self.pop(process)?;
                            self.push(process, v)?;
                        }
                        1 => {
                            let receiver = self.peek(process)?;
                            let v = self.bool_ref(!receiver.is_nil());
                            self.pop(process)?;
                            self.push(process, v)?;
                        }
                        _ => {
                            let selector = *self.common.unary.get(idx as usize).ok_or_else(|| {
                                InterpreterError::fatal("bytecode fault", "unary selector index out of range")
                            })?;
                            self.perform_send(process, top as usize, 1, selector, false, Ref::NIL)?;
                            sent = true;
                        }
                    }
                }
                Bytecode::SendBinary(idx) => {
                    let args = pop_peek_pair(self, process)?;
                    let prim = Primitive(Primitive::INTEGER_ARITH_BASE + idx);
                    let result = crate::primitive::integer_fast_path(prim, &args, self.true_obj, self.false_obj);
                    if result.is_nil() {
                        let selector = *self.common.binary.get(idx as usize).ok_or_else(|| {
                            InterpreterError::fatal("bytecode fault", "binary selector index out of range")
                        })?;
                        self.push(process, args[0])?;
                        self.push(process, args[1])?;
                        let top = self.stack_top(process)?;
                        self.perform_send(process, top as usize - 1, 2, selector, false, Ref::NIL)?;
                        sent = true;
                    } else {
                        self.push(process, result)?;
                    }
                }
                Bytecode::DoPrimitive { arg_count, primitive } => {
                    let args = self.pop_n(process, arg_count as usize)?;
                    let mut ctx = self.primitive_ctx();
                    let result = crate::primitive::dispatch(&mut ctx, Primitive(primitive), &args)?;
                    self.push(process, result)?;
                }
                Bytecode::DoSpecial(special) => match special {
                    Special::SelfReturn => {
                        let value = frame.argument(&self.memory, stack, 0)?;
                        if !self.do_return(process, value)? {
                            return Ok(false);
                        }
                    }
                    Special::StackReturn => {
                        let value = self.pop(process)?;
                        if !self.do_return(process, value)? {
                            return Ok(false);
                        }
                    }
                    Special::Duplicate => {
                        let v = self.peek(process)?;
                        self.push(process, v)?;
                    }
                    Special::PopTop => {
                        self.pop(process)?;
                    }
                    Special::Branch(target) => {
                        frame.set_byte_offset(&mut self.memory, stack, target as i32)?;
                    }
                    Special::BranchIfTrue(target) => {
                        let v = self.pop(process)?;
                        if v == self.true_obj {
                            frame.set_byte_offset(&mut self.memory, stack, target as i32)?;
                        }
                    }
                    Special::BranchIfFalse(target) => {
                        let v = self.pop(process)?;
                        if v == self.false_obj {
                            frame.set_byte_offset(&mut self.memory, stack, target as i32)?;
                        }
                    }
                    Special::AndBranch(target) => {
                        let v = self.peek(process)?;
                        if v == self.false_obj {
                            frame.set_byte_offset(&mut self.memory, stack, target as i32)?;
                        } else {
                            self.pop(process)?;
                        }
                    }
                    Special::OrBranch(target) => {
                        let v = self.peek(process)?;
                        if v == self.true_obj {
                            frame.set_byte_offset(&mut self.memory, stack, target as i32)?;
                        } else {
                            self.pop(process)?;
                        }
                    }
                    Special::SendToSuper(idx) => {
                        let owning_class = self.memory.fetch_pointer(method, method_fields::METHOD_CLASS)?;
                        let literals = self.memory.fetch_pointer(method, method_fields::LITERALS)?;
                        let selector = self.memory.fetch_pointer(literals, idx as usize + 1)?;
                        let top = self.stack_top(process)?;
                        self.perform_send(process, top as usize, 1, selector, true, owning_class)?;
                        sent = true;
                    }
                },
            }

            if sent {
                steps_left = steps_left.saturating_sub(1);
                // Almost always a no-op: `activate`/`activate_block` always
                // install a live frame. The one exception is a `blockReturn`
                // whose home was the process's outermost activation, which
                // finishes the process the same way an ordinary `SelfReturn`
                // from the outermost frame would.
                let link_now = self.memory.fetch_pointer(process, process_fields::LINK_PTR)?;
                if link_now.is_nil() {
                    return Ok(false);
                }
            }
        }
    }
}

/// Pop two operands for a `SendBinary` fast-path attempt without
/// discarding them if the fast path declines (`args[0]` is the receiver,
/// `args[1]` the argument).
fn pop_peek_pair(interp: &mut Interpreter, process: Ref) -> Result<[Ref; 2], InterpreterError> {
    let popped = interp.pop_n(process, 2)?;
    Ok([popped[0], popped[1]])
}

//! Call-frame addressing: the five-slot linkage header written onto a
//! process's stack array for every send, and the `Context` object a frame
//! reifies into once something observes `thisContext` or captures a block.
//!
//! A frame starts life on the stack and switches permanently to
//! [`Frame::Reified`] the moment `thisContext` is observed within it —
//! from then on every further read/write of its method, byte offset, or
//! temporaries goes through the `Context` object instead of the stack,
//! matching `original_source/src/interp.c`'s reification, which re-reads
//! state from the freshly built context and never looks at the old stack
//! slots again. A block's own activation frame is always born reified,
//! since its temporaries live in a captured `Context` from the start.

use pebble_types::Ref;

use crate::consts::{context_fields, method_fields, LINKAGE_HEADER_SIZE};
use crate::constructors::Constructors;
use crate::error::MemoryError;
use crate::memory::Memory;

/// One call frame, in whichever of the two representations it currently
/// lives as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Frame {
    /// Still living in the process stack's linkage header at `link_pointer`.
    Stack {
        /// 1-based index of this frame's linkage header within the stack
        /// array (the slot holding the previous link pointer).
        link_pointer: i32,
    },
    /// Reified onto the heap; every field below is read from `context`.
    Reified {
        /// The backing `Context` object.
        context: Ref,
    },
}

fn too_large(v: i32) -> MemoryError {
    MemoryError::TooLarge {
        requested: v as usize,
        max: i32::MAX as usize,
    }
}

impl Frame {
    /// Resolve whichever representation `link_pointer` currently uses by
    /// checking the stack's context-or-nil slot.
    pub(crate) fn resolve(memory: &Memory, stack: Ref, link_pointer: i32) -> Result<Frame, MemoryError> {
        let ctx = memory.fetch_pointer(stack, (link_pointer + 1) as usize)?;
        Ok(if ctx.is_nil() {
            Frame::Stack { link_pointer }
        } else {
            Frame::Reified { context: ctx }
        })
    }

    /// Resolve a process's current active frame from its `link_pointer`
    /// field, which is one of three things: `nil` (no active frame —
    /// the process has finished or never been sent anything), a tagged
    /// small integer (a stack-resident frame, possibly itself reified in
    /// place — see [`Frame::resolve`]), or a boxed reference directly to
    /// a `Context` object (a frame born reified, with no stack linkage
    /// header at all — exactly how a block activation is represented).
    pub(crate) fn resolve_active(memory: &Memory, stack: Ref, link: Ref) -> Result<Option<Frame>, MemoryError> {
        if link.is_nil() {
            return Ok(None);
        }
        if link.is_boxed() {
            return Ok(Some(Frame::Reified { context: link }));
        }
        let idx = link.as_small_int().unwrap_or(0);
        Ok(Some(Frame::resolve(memory, stack, idx)?))
    }

    pub(crate) fn method(&self, memory: &Memory, stack: Ref) -> Result<Ref, MemoryError> {
        match *self {
            Frame::Stack { link_pointer } => memory.fetch_pointer(stack, (link_pointer + 3) as usize),
            Frame::Reified { context } => memory.fetch_pointer(context, context_fields::METHOD),
        }
    }

    pub(crate) fn byte_offset(&self, memory: &Memory, stack: Ref) -> Result<i32, MemoryError> {
        let r = match *self {
            Frame::Stack { link_pointer } => memory.fetch_pointer(stack, (link_pointer + 4) as usize)?,
            Frame::Reified { context } => memory.fetch_pointer(context, context_fields::BYTE_OFFSET)?,
        };
        Ok(r.as_small_int().unwrap_or(1))
    }

    pub(crate) fn set_byte_offset(&self, memory: &mut Memory, stack: Ref, offset: i32) -> Result<(), MemoryError> {
        let tagged = Ref::small_int(offset).ok_or_else(|| too_large(offset))?;
        match *self {
            Frame::Stack { link_pointer } => memory.store_pointer(stack, (link_pointer + 4) as usize, tagged),
            Frame::Reified { context } => memory.store_pointer(context, context_fields::BYTE_OFFSET, tagged),
        }
    }

    /// The previous frame's link pointer, or `nil` if this is the
    /// outermost frame.
    pub(crate) fn prev_link(&self, memory: &Memory, stack: Ref) -> Result<Ref, MemoryError> {
        match *self {
            Frame::Stack { link_pointer } => memory.fetch_pointer(stack, link_pointer as usize),
            Frame::Reified { context } => memory.fetch_pointer(context, context_fields::LINK_PTR),
        }
    }

    /// The stack index where this frame's arguments (receiver first)
    /// begin, and the index the operand stack is truncated back to on
    /// return.
    pub(crate) fn return_point(&self, memory: &Memory, stack: Ref) -> Result<i32, MemoryError> {
        let r = match *self {
            Frame::Stack { link_pointer } => memory.fetch_pointer(stack, (link_pointer + 2) as usize)?,
            Frame::Reified { context } => memory.fetch_pointer(context, context_fields::RETURN_POINT)?,
        };
        Ok(r.as_small_int().unwrap_or(1))
    }

    pub(crate) fn argument(&self, memory: &Memory, stack: Ref, index: usize) -> Result<Ref, MemoryError> {
        match *self {
            Frame::Stack { .. } => {
                let base = self.return_point(memory, stack)?;
                memory.fetch_pointer(stack, base as usize + index)
            }
            Frame::Reified { context } => {
                let args = memory.fetch_pointer(context, context_fields::ARGUMENTS)?;
                memory.fetch_pointer(args, index + 1)
            }
        }
    }

    pub(crate) fn temporary(&self, memory: &Memory, stack: Ref, index: usize) -> Result<Ref, MemoryError> {
        match *self {
            Frame::Stack { link_pointer } => {
                memory.fetch_pointer(stack, link_pointer as usize + LINKAGE_HEADER_SIZE + index)
            }
            Frame::Reified { context } => {
                let temps = memory.fetch_pointer(context, context_fields::TEMPORARIES)?;
                memory.fetch_pointer(temps, index + 1)
            }
        }
    }

    pub(crate) fn set_temporary(
        &self,
        memory: &mut Memory,
        stack: Ref,
        index: usize,
        value: Ref,
    ) -> Result<(), MemoryError> {
        match *self {
            Frame::Stack { link_pointer } => {
                memory.store_pointer(stack, link_pointer as usize + LINKAGE_HEADER_SIZE + index, value)
            }
            Frame::Reified { context } => {
                let temps = memory.fetch_pointer(context, context_fields::TEMPORARIES)?;
                memory.store_pointer(temps, index + 1, value)
            }
        }
    }

    /// `thisContext`: reify this frame in place (idempotent — a
    /// already-reified frame just returns its existing `Context`),
    /// snapshotting its arguments and temporaries into fresh Arrays so a
    /// Block can still reach them after the home frame's stack slots have
    /// been overwritten by later sends.
    pub(crate) fn reify(
        self,
        memory: &mut Memory,
        constructors: &mut Constructors,
        stack: Ref,
    ) -> Result<Ref, MemoryError> {
        let link_pointer = match self {
            Frame::Reified { context } => return Ok(context),
            Frame::Stack { link_pointer } => link_pointer,
        };
        let method = self.method(memory, stack)?;
        let byte_offset = self.byte_offset(memory, stack)?;
        let prev_link = memory.fetch_pointer(stack, link_pointer as usize)?;
        let return_point = self.return_point(memory, stack)?;
        let arg_count = (link_pointer - return_point).max(0) as usize;
        let temp_size = memory
            .fetch_pointer(method, method_fields::TEMPORARY_SIZE)?
            .as_small_int()
            .unwrap_or(0)
            .max(0) as usize;

        let args = constructors.copy_from(memory, stack, return_point as usize, arg_count)?;
        let temps = constructors.copy_from(
            memory,
            stack,
            link_pointer as usize + LINKAGE_HEADER_SIZE,
            temp_size,
        )?;
        // `prev_link` is carried forward verbatim — nil, a stack-resident
        // caller's link-pointer index, or a boxed `Context` if the caller
        // was itself born reified — so returning from this frame resumes
        // exactly where the stack frame would have.
        let context = constructors.new_context(
            memory,
            prev_link,
            method,
            args,
            temps,
            byte_offset,
            return_point,
            Ref::NIL,
        )?;
        memory.store_pointer(stack, (link_pointer + 1) as usize, context)?;
        Ok(context)
    }
}

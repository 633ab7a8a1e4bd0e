//! Image (de)serialization.
//!
//! An image is a flat stream: the root symbols reference, then zero or
//! more object records in ascending table-index order. Every multi-byte
//! field is written in the host's native byte order, matching
//! `original_source/src/memory.c`'s `image_write`/`image_load`, which
//! `fwrite`/`fread` the in-memory struct layout directly with no
//! endianness conversion.

use std::io::{Read, Write};

use pebble_types::{Profile, Ref, Word};
use tracing::debug;

use super::Memory;
use crate::error::MemoryError;

fn write_ref<W: Write>(w: &mut W, profile: Profile, r: Ref) -> Result<(), MemoryError> {
    match profile {
        Profile::Small => {
            let v = i16::try_from(r.raw()).map_err(|_| MemoryError::TooLarge {
                requested: r.raw() as usize,
                max: i16::MAX as usize,
            })?;
            w.write_all(&v.to_ne_bytes())?;
        }
        Profile::Large => {
            w.write_all(&r.raw().to_ne_bytes())?;
        }
    }
    Ok(())
}

fn read_ref<R: Read>(r: &mut R, profile: Profile) -> Result<Ref, MemoryError> {
    let word: Word = match profile {
        Profile::Small => {
            let mut buf = [0u8; 2];
            r.read_exact(&mut buf)?;
            i16::from_ne_bytes(buf) as Word
        }
        Profile::Large => {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf)?;
            i32::from_ne_bytes(buf)
        }
    };
    Ok(Ref::from_raw(word))
}

fn write_index<W: Write>(w: &mut W, index: usize) -> Result<(), MemoryError> {
    let v = u16::try_from(index).map_err(|_| MemoryError::TooLarge {
        requested: index,
        max: u16::MAX as usize,
    })?;
    w.write_all(&v.to_ne_bytes())?;
    Ok(())
}

fn read_index<R: Read>(r: &mut R) -> Result<usize, MemoryError> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_ne_bytes(buf) as usize)
}

fn write_size<W: Write>(w: &mut W, size: i32) -> Result<(), MemoryError> {
    let v = i16::try_from(size).map_err(|_| MemoryError::TooLarge {
        requested: size.unsigned_abs() as usize,
        max: i16::MAX as usize,
    })?;
    w.write_all(&v.to_ne_bytes())?;
    Ok(())
}

fn read_size<R: Read>(r: &mut R) -> Result<i32, MemoryError> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(i16::from_ne_bytes(buf) as i32)
}

/// Write every live object (reference count > 0) to `w` as one flat image
/// stream, preceded by `symbols`, the root from which a loader must reach
/// every object worth keeping.
#[tracing::instrument(skip(memory, w))]
pub fn write_image<W: Write>(memory: &Memory, symbols: Ref, mut w: W) -> Result<(), MemoryError> {
    let profile = memory.profile();
    write_ref(&mut w, profile, symbols)?;
    let mut count = 0usize;
    for (index, view) in memory.live_objects() {
        write_index(&mut w, index)?;
        write_ref(&mut w, profile, view.class)?;
        if let Some(pointers) = view.pointers {
            write_size(&mut w, pointers.len() as i32)?;
            for p in pointers {
                write_ref(&mut w, profile, *p)?;
            }
        } else if let Some(bytes) = view.bytes {
            write_size(&mut w, -(bytes.len() as i32))?;
            w.write_all(bytes)?;
        } else {
            write_size(&mut w, 0)?;
        }
        count += 1;
    }
    debug!(objects = count, "image written");
    Ok(())
}

/// Read an image stream written by [`write_image`], building a fresh
/// [`Memory`] of the given profile/capacity. Returns the table and the
/// root symbols reference; the caller must still call
/// [`Memory::recover`] with the appropriate roots before the table's
/// reference counts are trustworthy.
#[tracing::instrument(skip(r))]
pub fn read_image<R: Read>(
    profile: Profile,
    capacity: usize,
    mut r: R,
) -> Result<(Memory, Ref), MemoryError> {
    let symbols = read_ref(&mut r, profile)?;
    let mut memory = Memory::new(profile, capacity);
    let mut count = 0usize;
    loop {
        let index = match read_index(&mut r) {
            Ok(i) => i,
            Err(MemoryError::Io(_)) => break,
            Err(e) => return Err(e),
        };
        let class = read_ref(&mut r, profile)?;
        let size = read_size(&mut r)?;
        if size > 0 {
            let mut pointers = Vec::with_capacity(size as usize);
            for _ in 0..size {
                pointers.push(read_ref(&mut r, profile)?);
            }
            memory.install_raw(index, class, Some(pointers), None);
        } else if size < 0 {
            let mut bytes = vec![0u8; (-size) as usize];
            r.read_exact(&mut bytes)?;
            memory.install_raw(index, class, None, Some(bytes));
        } else {
            memory.install_raw(index, class, None, None);
        }
        count += 1;
    }
    debug!(objects = count, "image loaded");
    Ok((memory, symbols))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_small_object_graph() {
        let mut memory = Memory::new(Profile::Small, 64);
        let leaf = memory.alloc_bytes_from(b"hi").unwrap();
        let root = memory.alloc_pointers(1).unwrap();
        memory.store_pointer(root, 1, leaf).unwrap();
        memory.incr(root); // simulate being reachable from "symbols"

        let mut buf = Vec::new();
        write_image(&memory, root, &mut buf).unwrap();

        let (mut loaded, symbols) = read_image(Profile::Small, 64, &buf[..]).unwrap();
        assert_eq!(symbols, root);
        loaded.recover(&[symbols]);

        assert!(loaded.is_live(root));
        let reloaded_leaf = loaded.fetch_pointer(root, 1).unwrap();
        assert_eq!(loaded.bytes(reloaded_leaf).unwrap(), b"hi");
    }

    #[test]
    fn recovery_frees_objects_unreachable_from_symbols() {
        let mut memory = Memory::new(Profile::Small, 64);
        let orphan = memory.alloc_pointers(0).unwrap();
        memory.incr(orphan); // written to the image, but not from a root
        let root = memory.alloc_pointers(0).unwrap();
        memory.incr(root);

        let mut buf = Vec::new();
        write_image(&memory, root, &mut buf).unwrap();

        let (mut loaded, symbols) = read_image(Profile::Small, 64, &buf[..]).unwrap();
        loaded.recover(&[symbols]);

        assert!(loaded.is_live(root));
        assert!(!loaded.is_live(orphan));
    }
}

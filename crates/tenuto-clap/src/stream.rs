//! Byte streams handed to the plugin's state extension.

use clap_sys::stream::{clap_istream, clap_ostream};
use std::ffi::c_void;
use std::marker::PhantomData;
use std::slice;

/// Output stream that appends to a borrowed buffer.
pub(crate) struct OutputStream<'a> {
    raw: clap_ostream,
    _buffer: PhantomData<&'a mut Vec<u8>>,
}

impl<'a> OutputStream<'a> {
    pub(crate) fn new(buffer: &'a mut Vec<u8>) -> Self {
        Self {
            raw: clap_ostream {
                ctx: buffer as *mut Vec<u8> as *mut c_void,
                write: Some(ostream_write),
            },
            _buffer: PhantomData,
        }
    }

    pub(crate) fn as_raw(&self) -> *const clap_ostream {
        &self.raw
    }
}

unsafe extern "C" fn ostream_write(
    stream: *const clap_ostream,
    buffer: *const c_void,
    size: u64,
) -> i64 {
    if stream.is_null() || (buffer.is_null() && size > 0) {
        return -1;
    }
    let out = &mut *((*stream).ctx as *mut Vec<u8>);
    if size > 0 {
        out.extend_from_slice(slice::from_raw_parts(buffer as *const u8, size as usize));
    }
    size as i64
}

struct ReadCursor<'a> {
    data: &'a [u8],
    position: usize,
}

/// Input stream over a borrowed byte slice.
pub(crate) struct InputStream<'a> {
    raw: clap_istream,
    // Boxed so the address in `raw.ctx` stays valid if the stream moves.
    _cursor: Box<ReadCursor<'a>>,
}

impl<'a> InputStream<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        let mut cursor = Box::new(ReadCursor { data, position: 0 });
        let raw = clap_istream {
            ctx: &mut *cursor as *mut ReadCursor<'a> as *mut c_void,
            read: Some(istream_read),
        };
        Self {
            raw,
            _cursor: cursor,
        }
    }

    pub(crate) fn as_raw(&self) -> *const clap_istream {
        &self.raw
    }
}

unsafe extern "C" fn istream_read(stream: *const clap_istream, buffer: *mut c_void, size: u64) -> i64 {
    if stream.is_null() || (buffer.is_null() && size > 0) {
        return -1;
    }
    let cursor = &mut *((*stream).ctx as *mut ReadCursor<'_>);
    let remaining = cursor.data.len() - cursor.position;
    let to_read = (size as usize).min(remaining);
    if to_read == 0 {
        return 0;
    }

    let source = &cursor.data[cursor.position..cursor.position + to_read];
    slice::from_raw_parts_mut(buffer as *mut u8, to_read).copy_from_slice(source);
    cursor.position += to_read;
    to_read as i64
}

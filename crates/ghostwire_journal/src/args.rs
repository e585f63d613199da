//! # Entry Arguments
//!
//! Every entry point's argument list is marshalled into the journal as a
//! single bit block. Tuples marshal their fields in order.

use ghostwire_core::Move;
use ghostwire_shared::{BitStream, StreamError, StreamResult};

/// An argument list that can be written to and read back from a journal.
pub trait JournalArgs: Sized {
    /// Writes the arguments.
    fn marshal(&self, stream: &mut BitStream);

    /// Reads arguments written by [`JournalArgs::marshal`].
    ///
    /// # Errors
    ///
    /// Propagates stream underruns and malformed strings.
    fn unmarshal(stream: &mut BitStream) -> StreamResult<Self>;
}

impl JournalArgs for () {
    fn marshal(&self, _stream: &mut BitStream) {}

    fn unmarshal(_stream: &mut BitStream) -> StreamResult<Self> {
        Ok(())
    }
}

impl JournalArgs for bool {
    fn marshal(&self, stream: &mut BitStream) {
        stream.write_flag(*self);
    }

    fn unmarshal(stream: &mut BitStream) -> StreamResult<Self> {
        stream.read_flag()
    }
}

impl JournalArgs for u32 {
    fn marshal(&self, stream: &mut BitStream) {
        stream.write_u32(*self);
    }

    fn unmarshal(stream: &mut BitStream) -> StreamResult<Self> {
        stream.read_u32()
    }
}

impl JournalArgs for i32 {
    #[allow(clippy::cast_sign_loss)]
    fn marshal(&self, stream: &mut BitStream) {
        stream.write_u32(*self as u32);
    }

    #[allow(clippy::cast_possible_wrap)]
    fn unmarshal(stream: &mut BitStream) -> StreamResult<Self> {
        Ok(stream.read_u32()? as i32)
    }
}

impl JournalArgs for f32 {
    fn marshal(&self, stream: &mut BitStream) {
        stream.write_f32(*self);
    }

    fn unmarshal(stream: &mut BitStream) -> StreamResult<Self> {
        stream.read_f32()
    }
}

/// Strings carry a 32-bit byte count, unlike wire strings, so a console line
/// of any length is journaled whole.
impl JournalArgs for String {
    fn marshal(&self, stream: &mut BitStream) {
        stream.write_bytes(self.as_bytes());
    }

    fn unmarshal(stream: &mut BitStream) -> StreamResult<Self> {
        String::from_utf8(stream.read_bytes()?).map_err(|_| StreamError::InvalidUtf8)
    }
}

impl JournalArgs for Vec<u8> {
    fn marshal(&self, stream: &mut BitStream) {
        stream.write_bytes(self);
    }

    fn unmarshal(stream: &mut BitStream) -> StreamResult<Self> {
        stream.read_bytes()
    }
}

/// Moves go through their own wire format, time included. Callers journal
/// prepared moves, so the quantization is already applied.
impl JournalArgs for Move {
    fn marshal(&self, stream: &mut BitStream) {
        self.pack(stream, None, true);
    }

    fn unmarshal(stream: &mut BitStream) -> StreamResult<Self> {
        Move::unpack(stream, &Move::new(), true)
    }
}

impl<A: JournalArgs, B: JournalArgs> JournalArgs for (A, B) {
    fn marshal(&self, stream: &mut BitStream) {
        self.0.marshal(stream);
        self.1.marshal(stream);
    }

    fn unmarshal(stream: &mut BitStream) -> StreamResult<Self> {
        let a = A::unmarshal(stream)?;
        let b = B::unmarshal(stream)?;
        Ok((a, b))
    }
}

impl<A: JournalArgs, B: JournalArgs, C: JournalArgs> JournalArgs for (A, B, C) {
    fn marshal(&self, stream: &mut BitStream) {
        self.0.marshal(stream);
        self.1.marshal(stream);
        self.2.marshal(stream);
    }

    fn unmarshal(stream: &mut BitStream) -> StreamResult<Self> {
        let a = A::unmarshal(stream)?;
        let b = B::unmarshal(stream)?;
        let c = C::unmarshal(stream)?;
        Ok((a, b, c))
    }
}

use std::io::{Error, ErrorKind, Read};

use super::{EntryVerifyError, VerifierEntry};

/// Wraps the decompressed stream of an entry and verifies its digest at the end of the stream.
///
/// The digest is checked as soon as `size` bytes were read, or the inner reader reports EOF,
/// whatever comes first. A mismatch is returned from that very `read()` call as an
/// [`ErrorKind::InvalidData`] error that wraps an [`EntryVerifyError`], and the data of that
/// call is withheld.
#[derive(Debug)]
pub struct VerifyingReader<'a, R> {
    inner: R,
    entry: VerifierEntry<'a>,
    remaining: u64,
    done: bool,
}

impl<'a, R: Read> VerifyingReader<'a, R> {
    /// `size` is the declared uncompressed size of the entry
    pub fn new(inner: R, entry: VerifierEntry<'a>, size: u64) -> Self {
        Self {
            inner,
            entry,
            remaining: size,
            done: false,
        }
    }

    /// The verification state of the entry
    pub fn entry(&self) -> &VerifierEntry<'a> {
        &self.entry
    }

    /// Return the wrapped reader, dropping the verification state
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn finish(&mut self) -> std::io::Result<()> {
        self.done = true;
        self.entry.verify().map_err(invalid_data)
    }
}

impl<R: Read> Read for VerifyingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.done {
            return Ok(0);
        }
        if self.remaining == 0 || buf.is_empty() {
            if self.remaining == 0 {
                self.finish()?;
            }
            return Ok(0);
        }

        let read = self.inner.read(buf)?;
        if read == 0 {
            self.finish()?;
            return Ok(0);
        }
        if read as u64 > self.remaining {
            self.done = true;
            self.entry.fail();
            return Err(invalid_data(EntryVerifyError::SizeExceeded(
                self.entry.name().to_owned(),
            )));
        }

        self.entry.write(&buf[..read]).map_err(invalid_data)?;
        self.remaining -= read as u64;
        if self.remaining == 0 {
            self.finish()?;
        }
        Ok(read)
    }
}

fn invalid_data(err: EntryVerifyError) -> Error {
    Error::new(ErrorKind::InvalidData, err)
}

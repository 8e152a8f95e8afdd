use bytes::{Buf, Bytes};

/// Integer signess in postgres docs is awful.
pub trait UsizeExt {
    /// Length is `usize` in rust, while postgres length prefix is `i32`,
    /// this will panic when overflow instead of wrapping.
    ///
    /// Only call this on lengths already checked against [`MAX_VALUE_LEN`].
    fn to_i32(self) -> i32;
}

/// The largest value length representable by the `i32` length prefix.
pub const MAX_VALUE_LEN: usize = i32::MAX as usize;

/// Nul string operation in [`Bytes`]
pub trait BytesExt {
    /// Try to read nul terminated string.
    ///
    /// Returns [`None`] if there is no nul terminator or the string is not utf8.
    fn get_nul_string(&mut self) -> Option<String>;
}

/// Helper trait to [`Display`][std::fmt::Display] bytes.
pub trait FmtExt {
    /// Lossy [`Display`][std::fmt::Display] bytes.
    fn lossy(&self) -> LossyFmt<'_>;
}

/// Lossy [`Display`][std::fmt::Display] implementation for bytes.
pub struct LossyFmt<'a>(pub &'a [u8]);

impl UsizeExt for usize {
    fn to_i32(self) -> i32 {
        self.try_into().expect("value size too large for protocol")
    }
}

impl BytesExt for Bytes {
    fn get_nul_string(&mut self) -> Option<String> {
        let end = self.iter().position(|e| matches!(e, b'\0'))?;
        let me = self.split_to(end);
        Buf::advance(self, 1); // nul
        String::from_utf8(me.into()).ok()
    }
}

impl FmtExt for [u8] {
    fn lossy(&self) -> LossyFmt<'_> {
        LossyFmt(self)
    }
}

impl std::fmt::Display for LossyFmt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &b in self.0 {
            if b.is_ascii_graphic() || b.is_ascii_whitespace() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:x}")?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for LossyFmt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nul_string() {
        let mut bytes = Bytes::from_static(b"id\0rest");
        assert_eq!(bytes.get_nul_string().as_deref(), Some("id"));
        assert_eq!(&bytes[..], b"rest");
        assert!(bytes.get_nul_string().is_none());
    }

    #[test]
    fn lossy_display() {
        assert_eq!(b"ab\x01"[..].lossy().to_string(), "ab\\x1");
    }
}

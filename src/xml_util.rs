//! Small XML escaping helpers shared by the hand-built response bodies.
//!
//! Response XML in this crate is assembled with `format!`, matching the
//! teacher's style (see `s3::handlers`), rather than derived through a
//! generic serializer — but every piece of client-controlled text (keys,
//! prefixes, metadata values, error messages) must still be escaped before
//! it lands in a document, so we lean on `quick_xml`'s escaper for that one
//! piece rather than hand-rolling it.

use std::borrow::Cow;

pub fn escape(input: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_reserved_characters() {
        assert_eq!(escape("a&b<c>d\"e'f"), "a&amp;b&lt;c&gt;d&quot;e&apos;f");
    }

    #[test]
    fn leaves_plain_text_alone() {
        assert_eq!(escape("plain-key_1.txt"), "plain-key_1.txt");
    }
}

use std::io::{Result as IoResult, Write};


/// Receives the structural events of a JSON document in emission order.
///
/// The decoder drives a sink depth-first: every `key` is followed by exactly
/// one value event (or a balanced begin/end pair). Formatting is entirely
/// the sink's concern.
pub trait JsonSink {
    fn begin_object(&mut self) -> IoResult<()>;
    fn end_object(&mut self) -> IoResult<()>;
    fn begin_array(&mut self) -> IoResult<()>;
    fn end_array(&mut self) -> IoResult<()>;
    fn key(&mut self, key: &str) -> IoResult<()>;
    fn string_value(&mut self, value: &str) -> IoResult<()>;
    fn int_value(&mut self, value: i64) -> IoResult<()>;
    fn null_value(&mut self) -> IoResult<()>;
}

/// Streaming pretty-printer for the JSON subset the decoder emits.
///
/// Objects print one member per line with three-space indentation; arrays
/// print inline. Only `"`, `\`, and newline are escaped inside strings;
/// other control characters pass through untouched.
#[derive(Debug)]
pub struct JsonWriter<W> {
    writer:     W,
    indent:     usize,
    need_comma: bool,
}

impl<W: Write> JsonWriter<W> {
    #[inline]
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            indent:     0,
            need_comma: false,
        }
    }

    /// Hand back the underlying writer.
    #[inline]
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn newline_and_indent(&mut self) -> IoResult<()> {
        self.writer.write_all(b"\n")?;
        for _ in 0..self.indent {
            self.writer.write_all(b"   ")?;
        }
        Ok(())
    }

    /// Separator written before a value in element position (arrays print
    /// inline, so it is a plain `", "`).
    fn separate_value(&mut self) -> IoResult<()> {
        if self.need_comma {
            self.writer.write_all(b", ")?;
        }
        Ok(())
    }

    fn write_escaped(&mut self, text: &str) -> IoResult<()> {
        for ch in text.chars() {
            match ch {
                '"'  => self.writer.write_all(b"\\\"")?,
                '\\' => self.writer.write_all(b"\\\\")?,
                '\n' => self.writer.write_all(b"\\n")?,
                _    => write!(self.writer, "{ch}")?,
            }
        }
        Ok(())
    }
}

impl<W: Write> JsonSink for JsonWriter<W> {
    fn begin_object(&mut self) -> IoResult<()> {
        self.separate_value()?;
        self.writer.write_all(b"{")?;
        self.indent += 1;
        self.need_comma = false;
        Ok(())
    }

    fn end_object(&mut self) -> IoResult<()> {
        self.indent -= 1;
        self.newline_and_indent()?;
        self.writer.write_all(b"}")?;
        self.need_comma = true;
        Ok(())
    }

    fn begin_array(&mut self) -> IoResult<()> {
        self.separate_value()?;
        self.writer.write_all(b"[")?;
        self.need_comma = false;
        Ok(())
    }

    fn end_array(&mut self) -> IoResult<()> {
        self.writer.write_all(b"]")?;
        self.need_comma = true;
        Ok(())
    }

    fn key(&mut self, key: &str) -> IoResult<()> {
        if self.need_comma {
            self.writer.write_all(b",")?;
        }
        self.newline_and_indent()?;
        self.writer.write_all(b"\"")?;
        self.write_escaped(key)?;
        self.writer.write_all(b"\": ")?;
        self.need_comma = false;
        Ok(())
    }

    fn string_value(&mut self, value: &str) -> IoResult<()> {
        self.separate_value()?;
        self.writer.write_all(b"\"")?;
        self.write_escaped(value)?;
        self.writer.write_all(b"\"")?;
        self.need_comma = true;
        Ok(())
    }

    fn int_value(&mut self, value: i64) -> IoResult<()> {
        self.separate_value()?;
        write!(self.writer, "{value}")?;
        self.need_comma = true;
        Ok(())
    }

    fn null_value(&mut self) -> IoResult<()> {
        self.separate_value()?;
        self.writer.write_all(b"null")?;
        self.need_comma = true;
        Ok(())
    }
}

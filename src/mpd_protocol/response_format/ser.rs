//! serde serializer for the `key: value` response encoding.
//!
//! Two layers: [`Lines`] handles whole responses (structs, sequences of
//! structs, lists of preformatted lines) and [`Value`] renders a single
//! field value to text. A field whose value renders to `None` is omitted
//! together with its key.

use std::fmt::Display;
use std::fmt::Write;

use serde::{Serialize, ser};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Message(String),
    #[error("type cannot be represented in a key-value response")]
    Unsupported,
}

impl ser::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Message(msg.to_string())
    }
}

pub fn to_string<T: Serialize>(value: &T) -> Result<String, Error> {
    let mut out = String::new();
    value.serialize(Lines { out: &mut out })?;
    Ok(out)
}

/// Serializer for whole responses; appends full lines to the output.
struct Lines<'a> {
    out: &'a mut String,
}

impl<'a> ser::Serializer for Lines<'a> {
    type Ok = ();
    type Error = Error;

    type SerializeSeq = SeqLines<'a>;
    type SerializeStruct = StructLines<'a>;
    type SerializeTuple = ser::Impossible<(), Error>;
    type SerializeTupleStruct = ser::Impossible<(), Error>;
    type SerializeTupleVariant = ser::Impossible<(), Error>;
    type SerializeMap = ser::Impossible<(), Error>;
    type SerializeStructVariant = ser::Impossible<(), Error>;

    fn serialize_str(self, v: &str) -> Result<(), Error> {
        self.out.push_str(v);
        self.out.push('\n');
        Ok(())
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Error> {
        Ok(StructLines { out: self.out })
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, Error> {
        Ok(SeqLines { out: self.out })
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<(), Error> {
        value.serialize(self)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<(), Error> {
        value.serialize(self)
    }

    fn serialize_none(self) -> Result<(), Error> {
        Ok(())
    }

    fn serialize_unit(self) -> Result<(), Error> {
        Ok(())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<(), Error> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<(), Error> {
        self.serialize_str(variant)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn serialize_bool(self, _: bool) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn serialize_i8(self, _: i8) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn serialize_i16(self, _: i16) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn serialize_i32(self, _: i32) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn serialize_i64(self, _: i64) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn serialize_u8(self, _: u8) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn serialize_u16(self, _: u16) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn serialize_u32(self, _: u32) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn serialize_u64(self, _: u64) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn serialize_f32(self, _: f32) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn serialize_f64(self, _: f64) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn serialize_char(self, _: char) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn serialize_bytes(self, _: &[u8]) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Error> {
        Err(Error::Unsupported)
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, Error> {
        Err(Error::Unsupported)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, Error> {
        Err(Error::Unsupported)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, Error> {
        Err(Error::Unsupported)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Error> {
        Err(Error::Unsupported)
    }
}

struct SeqLines<'a> {
    out: &'a mut String,
}

impl ser::SerializeSeq for SeqLines<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        value.serialize(Lines { out: &mut *self.out })
    }

    fn end(self) -> Result<(), Error> {
        Ok(())
    }
}

struct StructLines<'a> {
    out: &'a mut String,
}

impl ser::SerializeStruct for StructLines<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Error> {
        if let Some(rendered) = value.serialize(Value)? {
            // writing to a String cannot fail
            let _ = writeln!(self.out, "{key}: {rendered}");
        }
        Ok(())
    }

    fn end(self) -> Result<(), Error> {
        Ok(())
    }
}

/// Renders one field value, or `None` for absent values.
struct Value;

macro_rules! render_with_display {
    ($($method:ident: $ty:ty,)*) => {
        $(fn $method(self, v: $ty) -> Result<Option<String>, Error> {
            Ok(Some(v.to_string()))
        })*
    };
}

impl ser::Serializer for Value {
    type Ok = Option<String>;
    type Error = Error;

    type SerializeSeq = ser::Impossible<Option<String>, Error>;
    type SerializeStruct = ser::Impossible<Option<String>, Error>;
    type SerializeTuple = ser::Impossible<Option<String>, Error>;
    type SerializeTupleStruct = ser::Impossible<Option<String>, Error>;
    type SerializeTupleVariant = ser::Impossible<Option<String>, Error>;
    type SerializeMap = ser::Impossible<Option<String>, Error>;
    type SerializeStructVariant = ser::Impossible<Option<String>, Error>;

    render_with_display! {
        serialize_i8: i8,
        serialize_i16: i16,
        serialize_i32: i32,
        serialize_i64: i64,
        serialize_u8: u8,
        serialize_u16: u16,
        serialize_u32: u32,
        serialize_u64: u64,
        serialize_char: char,
    }

    fn serialize_str(self, v: &str) -> Result<Option<String>, Error> {
        Ok(Some(v.to_owned()))
    }

    fn serialize_bool(self, v: bool) -> Result<Option<String>, Error> {
        Ok(Some(if v { "1" } else { "0" }.to_owned()))
    }

    fn serialize_f32(self, v: f32) -> Result<Option<String>, Error> {
        Ok(Some(format!("{v:.3}")))
    }

    fn serialize_f64(self, v: f64) -> Result<Option<String>, Error> {
        Ok(Some(format!("{v:.3}")))
    }

    fn serialize_none(self) -> Result<Option<String>, Error> {
        Ok(None)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Option<String>, Error> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Option<String>, Error> {
        Ok(None)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Option<String>, Error> {
        Ok(None)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Option<String>, Error> {
        Ok(Some(variant.to_owned()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Option<String>, Error> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Option<String>, Error> {
        Err(Error::Unsupported)
    }

    fn serialize_bytes(self, _: &[u8]) -> Result<Option<String>, Error> {
        Err(Error::Unsupported)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, Error> {
        Err(Error::Unsupported)
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Error> {
        Err(Error::Unsupported)
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Error> {
        Err(Error::Unsupported)
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, Error> {
        Err(Error::Unsupported)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, Error> {
        Err(Error::Unsupported)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, Error> {
        Err(Error::Unsupported)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Error> {
        Err(Error::Unsupported)
    }
}

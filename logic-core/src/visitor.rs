// Copyright (c) 2019-present Dmitry Stepanov and Fyrox Engine contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Visitor is a tree-based binary serializer/deserializer.
//!
//! Data is organized into named *regions* (see [`Visitor::enter_region`]), each
//! holding named *fields* plus any number of named child regions. A type implements
//! [`Visit`] by entering a region and visiting its fields/children in a fixed order;
//! the same code path is used for both writing (the field is read from `self` and
//! stored) and reading (the field is read from the buffer and written into `self`),
//! distinguished by [`Visitor::is_reading`].
//!
//! This is how every persisted engine structure (properties, nodes, links, the whole
//! object graph) is turned into bytes - see the binary file format in the
//! `logic-engine` crate for the top-level layout built on top of this.

use crate::pool::{Handle, Pool};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::{
    fmt::{Debug, Display, Formatter},
    io::{Cursor, Read},
    ops::{Deref, DerefMut},
};

/// Current binary format version understood by this build. Bumped whenever the
/// tag/region encoding itself changes (not when a particular engine type's schema
/// changes - that is the caller's responsibility to version, see the tool/host-scene
/// version headers in `logic-engine::format`).
pub const VISITOR_VERSION: u32 = 1;

const MAGIC: &[u8; 4] = b"LVIS";

/// An error produced while visiting (reading or writing) data.
#[derive(Debug)]
pub enum VisitError {
    /// Generic I/O failure while reading/writing the underlying buffer or file.
    Io(std::io::Error),
    /// The buffer's magic number or version did not match what this build supports.
    NotSupportedFormat,
    /// A region was entered that does not exist while reading.
    RegionDoesNotExist(String),
    /// A region was entered twice while writing.
    RegionAlreadyExists(String),
    /// A field was visited that does not exist while reading.
    FieldDoesNotExist(String),
    /// A field was visited twice while writing.
    FieldAlreadyExists(String),
    /// A field exists but its on-disk type tag does not match what the reader expected.
    TypeMismatch,
    /// Custom error raised by a particular [`Visit`] implementation.
    User(String),
}

impl Display for VisitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VisitError::Io(e) => write!(f, "io error: {e}"),
            VisitError::NotSupportedFormat => write!(f, "unsupported or unrecognized format"),
            VisitError::RegionDoesNotExist(name) => write!(f, "region does not exist: {name}"),
            VisitError::RegionAlreadyExists(name) => write!(f, "region already exists: {name}"),
            VisitError::FieldDoesNotExist(name) => write!(f, "field does not exist: {name}"),
            VisitError::FieldAlreadyExists(name) => write!(f, "field already exists: {name}"),
            VisitError::TypeMismatch => write!(f, "field type mismatch"),
            VisitError::User(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for VisitError {}

impl From<std::io::Error> for VisitError {
    fn from(e: std::io::Error) -> Self {
        VisitError::Io(e)
    }
}

impl From<String> for VisitError {
    fn from(s: String) -> Self {
        VisitError::User(s)
    }
}

/// Result of a single visit operation.
pub type VisitResult = Result<(), VisitError>;

#[derive(Clone, Debug)]
enum FieldValue {
    Bool(bool),
    U8(u8),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
}

#[derive(Clone, Debug)]
struct Field {
    name: String,
    value: FieldValue,
}

/// A named node in the visitor's intermediate tree: a bag of fields plus named children.
#[derive(Clone, Debug, Default)]
struct VisitorNode {
    parent: Handle<VisitorNode>,
    name: String,
    fields: Vec<Field>,
    children: Vec<Handle<VisitorNode>>,
}

impl VisitorNode {
    fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Tree-based serializer/deserializer. One [`Visitor`] is used for a whole save or
/// load operation; it holds an internal cursor (`current`) that [`Region`] guards
/// move as code descends/ascends the tree.
pub struct Visitor {
    reading: bool,
    nodes: Pool<VisitorNode>,
    root: Handle<VisitorNode>,
    current: Handle<VisitorNode>,
}

impl Default for Visitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Visitor {
    /// Creates an empty visitor in writing mode.
    pub fn new() -> Self {
        let mut nodes = Pool::new();
        let root = nodes.spawn(VisitorNode {
            name: "__root__".to_string(),
            ..Default::default()
        });
        Self {
            reading: false,
            nodes,
            root,
            current: root,
        }
    }

    /// True if this visitor is currently reading (deserializing) rather than writing.
    pub fn is_reading(&self) -> bool {
        self.reading
    }

    /// Enters (or, while writing, creates) a named region below the current cursor
    /// position, descends into it, and returns a guard that restores the cursor to
    /// its previous position on drop.
    pub fn enter_region(&mut self, name: &str) -> Result<Region<'_>, VisitError> {
        let parent = self.current;
        let target = if self.reading {
            let parent_node = self.nodes.borrow(parent);
            let existing = parent_node
                .children
                .iter()
                .copied()
                .find(|&h| self.nodes.borrow(h).name == name);
            existing.ok_or_else(|| VisitError::RegionDoesNotExist(name.to_string()))?
        } else {
            let parent_node = self.nodes.borrow(parent);
            if parent_node.children.iter().any(|&h| self.nodes.borrow(h).name == name) {
                return Err(VisitError::RegionAlreadyExists(name.to_string()));
            }
            let child = self.nodes.spawn(VisitorNode {
                parent,
                name: name.to_string(),
                ..Default::default()
            });
            self.nodes.borrow_mut(parent).children.push(child);
            child
        };
        self.current = target;
        Ok(Region {
            visitor: self,
            saved_parent: parent,
        })
    }

    /// Serializes `entity` into a fresh [`Visitor`] under the region name `"Data"` and
    /// returns the encoded bytes.
    pub fn save_binary(entity: &mut dyn Visit) -> Result<Vec<u8>, VisitError> {
        let mut visitor = Visitor::new();
        entity.visit("Data", &mut visitor)?;
        Ok(visitor.encode())
    }

    /// Parses a byte buffer produced by [`Self::save_binary`] and visits `entity` with
    /// it, filling `entity` with the decoded values.
    pub fn load_binary(bytes: &[u8], entity: &mut dyn Visit) -> Result<(), VisitError> {
        let mut visitor = Visitor::decode(bytes)?;
        entity.visit("Data", &mut visitor)
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.write_u32::<LittleEndian>(VISITOR_VERSION).unwrap();
        write_node(&mut out, &self.nodes, self.root);
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, VisitError> {
        if bytes.len() < 8 || &bytes[0..4] != MAGIC {
            return Err(VisitError::NotSupportedFormat);
        }
        let mut cursor = Cursor::new(&bytes[4..]);
        let version = cursor.read_u32::<LittleEndian>()?;
        if version != VISITOR_VERSION {
            return Err(VisitError::NotSupportedFormat);
        }
        let mut nodes = Pool::new();
        let root = read_node(&mut cursor, &mut nodes, Handle::NONE, "__root__")?;
        Ok(Self {
            reading: true,
            nodes,
            root,
            current: root,
        })
    }

    fn write_field(&mut self, name: &str, value: FieldValue) -> VisitResult {
        let node = self.nodes.borrow_mut(self.current);
        if node.field(name).is_some() {
            return Err(VisitError::FieldAlreadyExists(name.to_string()));
        }
        node.fields.push(Field {
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    fn read_field(&self, name: &str) -> Result<&FieldValue, VisitError> {
        self.nodes
            .borrow(self.current)
            .field(name)
            .map(|f| &f.value)
            .ok_or_else(|| VisitError::FieldDoesNotExist(name.to_string()))
    }

    /// Names of the child regions of the current region, in encounter order. Useful
    /// when reading a dynamic list of named entries (e.g. struct property children).
    pub fn child_names(&self) -> Vec<String> {
        self.nodes
            .borrow(self.current)
            .children
            .iter()
            .map(|&h| self.nodes.borrow(h).name.clone())
            .collect()
    }

    /// Names of the fields of the current region, in encounter order.
    pub fn field_names(&self) -> Vec<String> {
        self.nodes
            .borrow(self.current)
            .fields
            .iter()
            .map(|f| f.name.clone())
            .collect()
    }
}

fn write_node(out: &mut Vec<u8>, nodes: &Pool<VisitorNode>, handle: Handle<VisitorNode>) {
    let node = nodes.borrow(handle);
    out.write_u32::<LittleEndian>(node.fields.len() as u32).unwrap();
    for field in &node.fields {
        write_string(out, &field.name);
        match &field.value {
            FieldValue::Bool(v) => {
                out.push(0);
                out.push(*v as u8);
            }
            FieldValue::U8(v) => {
                out.push(1);
                out.push(*v);
            }
            FieldValue::I32(v) => {
                out.push(2);
                out.write_i32::<LittleEndian>(*v).unwrap();
            }
            FieldValue::U32(v) => {
                out.push(3);
                out.write_u32::<LittleEndian>(*v).unwrap();
            }
            FieldValue::I64(v) => {
                out.push(4);
                out.write_i64::<LittleEndian>(*v).unwrap();
            }
            FieldValue::U64(v) => {
                out.push(5);
                out.write_u64::<LittleEndian>(*v).unwrap();
            }
            FieldValue::F32(v) => {
                out.push(6);
                out.write_f32::<LittleEndian>(*v).unwrap();
            }
            FieldValue::F64(v) => {
                out.push(7);
                out.write_f64::<LittleEndian>(*v).unwrap();
            }
            FieldValue::String(v) => {
                out.push(8);
                write_string(out, v);
            }
            FieldValue::Bytes(v) => {
                out.push(9);
                out.write_u32::<LittleEndian>(v.len() as u32).unwrap();
                out.extend_from_slice(v);
            }
        }
    }
    out.write_u32::<LittleEndian>(node.children.len() as u32).unwrap();
    for &child in &node.children {
        write_string(out, &nodes.borrow(child).name);
        write_node(out, nodes, child);
    }
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.write_u32::<LittleEndian>(s.len() as u32).unwrap();
    out.extend_from_slice(s.as_bytes());
}

fn read_string(cursor: &mut Cursor<&[u8]>) -> Result<String, VisitError> {
    let len = cursor.read_u32::<LittleEndian>()? as usize;
    let mut buf = vec![0u8; len];
    cursor.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| VisitError::NotSupportedFormat)
}

fn read_node(
    cursor: &mut Cursor<&[u8]>,
    nodes: &mut Pool<VisitorNode>,
    parent: Handle<VisitorNode>,
    name: &str,
) -> Result<Handle<VisitorNode>, VisitError> {
    let field_count = cursor.read_u32::<LittleEndian>()?;
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        let fname = read_string(cursor)?;
        let tag = {
            let mut b = [0u8; 1];
            cursor.read_exact(&mut b)?;
            b[0]
        };
        let value = match tag {
            0 => FieldValue::Bool(cursor.read_u8()? != 0),
            1 => FieldValue::U8(cursor.read_u8()?),
            2 => FieldValue::I32(cursor.read_i32::<LittleEndian>()?),
            3 => FieldValue::U32(cursor.read_u32::<LittleEndian>()?),
            4 => FieldValue::I64(cursor.read_i64::<LittleEndian>()?),
            5 => FieldValue::U64(cursor.read_u64::<LittleEndian>()?),
            6 => FieldValue::F32(cursor.read_f32::<LittleEndian>()?),
            7 => FieldValue::F64(cursor.read_f64::<LittleEndian>()?),
            8 => FieldValue::String(read_string(cursor)?),
            9 => {
                let len = cursor.read_u32::<LittleEndian>()? as usize;
                let mut buf = vec![0u8; len];
                cursor.read_exact(&mut buf)?;
                FieldValue::Bytes(buf)
            }
            _ => return Err(VisitError::NotSupportedFormat),
        };
        fields.push(Field { name: fname, value });
    }
    let handle = nodes.spawn(VisitorNode {
        parent,
        name: name.to_string(),
        fields,
        children: Vec::new(),
    });
    let child_count = cursor.read_u32::<LittleEndian>()?;
    let mut children = Vec::with_capacity(child_count as usize);
    for _ in 0..child_count {
        let cname = read_string(cursor)?;
        children.push(read_node(cursor, nodes, handle, &cname)?);
    }
    nodes.borrow_mut(handle).children = children;
    Ok(handle)
}

/// RAII cursor into one level of the visitor's tree, created by [`Visitor::enter_region`].
/// Derefs to the underlying [`Visitor`] so that nested `foo.visit(name, &mut region)`
/// calls work the same whether `region` is the top-level visitor or a nested one.
pub struct Region<'a> {
    visitor: &'a mut Visitor,
    saved_parent: Handle<VisitorNode>,
}

impl Deref for Region<'_> {
    type Target = Visitor;

    fn deref(&self) -> &Self::Target {
        self.visitor
    }
}

impl DerefMut for Region<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.visitor
    }
}

impl Drop for Region<'_> {
    fn drop(&mut self) {
        self.visitor.current = self.saved_parent;
    }
}

/// A type that can write itself into, or read itself from, a [`Visitor`].
pub trait Visit {
    /// Visits `self` under field/region name `name`. Whether this reads or writes is
    /// determined by `visitor.is_reading()`.
    fn visit(&mut self, name: &str, visitor: &mut Visitor) -> VisitResult;
}

macro_rules! impl_visit_leaf {
    ($ty:ty, $variant:ident, $as_fn:ident) => {
        impl Visit for $ty {
            fn visit(&mut self, name: &str, visitor: &mut Visitor) -> VisitResult {
                if visitor.is_reading() {
                    match visitor.read_field(name)? {
                        FieldValue::$variant(v) => {
                            *self = (*v) as $ty;
                            Ok(())
                        }
                        _ => Err(VisitError::TypeMismatch),
                    }
                } else {
                    visitor.write_field(name, FieldValue::$variant($as_fn(*self)))
                }
            }
        }
    };
}

fn identity_bool(v: bool) -> bool {
    v
}
fn identity_u8(v: u8) -> u8 {
    v
}
fn identity_i32(v: i32) -> i32 {
    v
}
fn identity_u32(v: u32) -> u32 {
    v
}
fn identity_i64(v: i64) -> i64 {
    v
}
fn identity_u64(v: u64) -> u64 {
    v
}
fn identity_f32(v: f32) -> f32 {
    v
}
fn identity_f64(v: f64) -> f64 {
    v
}

impl_visit_leaf!(bool, Bool, identity_bool);
impl_visit_leaf!(u8, U8, identity_u8);
impl_visit_leaf!(i32, I32, identity_i32);
impl_visit_leaf!(u32, U32, identity_u32);
impl_visit_leaf!(i64, I64, identity_i64);
impl_visit_leaf!(u64, U64, identity_u64);
impl_visit_leaf!(f32, F32, identity_f32);
impl_visit_leaf!(f64, F64, identity_f64);

impl Visit for usize {
    fn visit(&mut self, name: &str, visitor: &mut Visitor) -> VisitResult {
        if visitor.is_reading() {
            match visitor.read_field(name)? {
                FieldValue::U64(v) => {
                    *self = *v as usize;
                    Ok(())
                }
                _ => Err(VisitError::TypeMismatch),
            }
        } else {
            visitor.write_field(name, FieldValue::U64(*self as u64))
        }
    }
}

impl Visit for String {
    fn visit(&mut self, name: &str, visitor: &mut Visitor) -> VisitResult {
        if visitor.is_reading() {
            match visitor.read_field(name)? {
                FieldValue::String(v) => {
                    *self = v.clone();
                    Ok(())
                }
                _ => Err(VisitError::TypeMismatch),
            }
        } else {
            visitor.write_field(name, FieldValue::String(self.clone()))
        }
    }
}

impl Visit for Vec<u8> {
    fn visit(&mut self, name: &str, visitor: &mut Visitor) -> VisitResult {
        if visitor.is_reading() {
            match visitor.read_field(name)? {
                FieldValue::Bytes(v) => {
                    *self = v.clone();
                    Ok(())
                }
                _ => Err(VisitError::TypeMismatch),
            }
        } else {
            visitor.write_field(name, FieldValue::Bytes(self.clone()))
        }
    }
}

impl<T: Visit + Default> Visit for Vec<T> {
    fn visit(&mut self, name: &str, visitor: &mut Visitor) -> VisitResult {
        let mut region = visitor.enter_region(name)?;
        let mut len = self.len() as u32;
        len.visit("Length", &mut region)?;
        if region.is_reading() {
            self.clear();
            for i in 0..len {
                let mut item = T::default();
                item.visit(&format!("Item{i}"), &mut region)?;
                self.push(item);
            }
        } else {
            for (i, item) in self.iter_mut().enumerate() {
                item.visit(&format!("Item{i}"), &mut region)?;
            }
        }
        Ok(())
    }
}

impl<T: Visit + Default> Visit for Option<T> {
    fn visit(&mut self, name: &str, visitor: &mut Visitor) -> VisitResult {
        let mut region = visitor.enter_region(name)?;
        let mut present = self.is_some();
        present.visit("IsSome", &mut region)?;
        if region.is_reading() {
            if present {
                let mut value = T::default();
                value.visit("Value", &mut region)?;
                *self = Some(value);
            } else {
                *self = None;
            }
        } else if let Some(value) = self {
            value.visit("Value", &mut region)?;
        }
        Ok(())
    }
}

impl<T: Visit + Default> Visit for Box<T> {
    fn visit(&mut self, name: &str, visitor: &mut Visitor) -> VisitResult {
        (**self).visit(name, visitor)
    }
}

impl<T> Visit for std::marker::PhantomData<T> {
    fn visit(&mut self, _name: &str, _visitor: &mut Visitor) -> VisitResult {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Default, PartialEq, Debug)]
    struct Inner {
        a: i32,
        name: String,
    }

    impl Visit for Inner {
        fn visit(&mut self, name: &str, visitor: &mut Visitor) -> VisitResult {
            let mut region = visitor.enter_region(name)?;
            self.a.visit("A", &mut region)?;
            self.name.visit("Name", &mut region)?;
            Ok(())
        }
    }

    #[derive(Default, PartialEq, Debug)]
    struct Outer {
        inner: Inner,
        values: Vec<i32>,
        maybe: Option<i32>,
    }

    impl Visit for Outer {
        fn visit(&mut self, name: &str, visitor: &mut Visitor) -> VisitResult {
            let mut region = visitor.enter_region(name)?;
            self.inner.visit("Inner", &mut region)?;
            self.values.visit("Values", &mut region)?;
            self.maybe.visit("Maybe", &mut region)?;
            Ok(())
        }
    }

    #[test]
    fn round_trip() {
        let mut original = Outer {
            inner: Inner {
                a: 42,
                name: "hello".to_string(),
            },
            values: vec![1, 2, 3],
            maybe: Some(7),
        };

        let bytes = Visitor::save_binary(&mut original).unwrap();

        let mut restored = Outer::default();
        Visitor::load_binary(&bytes, &mut restored).unwrap();

        assert_eq!(original, restored);
    }

    #[test]
    fn rejects_bad_magic() {
        let err = Visitor::load_binary(b"nope", &mut Outer::default()).unwrap_err();
        assert!(matches!(err, VisitError::NotSupportedFormat));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.write_u32::<LittleEndian>(VISITOR_VERSION + 1).unwrap();
        let err = Visitor::load_binary(&bytes, &mut Outer::default()).unwrap_err();
        assert!(matches!(err, VisitError::NotSupportedFormat));
    }

    #[test]
    fn boxed_value_round_trips() {
        let mut original = Box::new(Inner {
            a: 9,
            name: "boxed".to_string(),
        });
        let bytes = Visitor::save_binary(&mut original).unwrap();
        let mut restored = Box::<Inner>::default();
        Visitor::load_binary(&bytes, &mut restored).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn missing_field_on_read_is_an_error() {
        let mut original = Inner {
            a: 1,
            name: "x".into(),
        };
        let bytes = Visitor::save_binary(&mut original).unwrap();

        // A type that expects an extra field that was never written.
        #[derive(Default)]
        struct Stricter {
            a: i32,
            name: String,
            extra: i32,
        }
        impl Visit for Stricter {
            fn visit(&mut self, name: &str, visitor: &mut Visitor) -> VisitResult {
                let mut region = visitor.enter_region(name)?;
                self.a.visit("A", &mut region)?;
                self.name.visit("Name", &mut region)?;
                self.extra.visit("Extra", &mut region)?;
                Ok(())
            }
        }

        let mut restored = Stricter::default();
        let err = Visitor::load_binary(&bytes, &mut restored).unwrap_err();
        assert!(matches!(err, VisitError::FieldDoesNotExist(_)));
    }
}

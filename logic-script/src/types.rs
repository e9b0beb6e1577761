//! The property type vocabulary a script's `interface()` declares with, and the tree
//! shape used to describe an extracted `IN`/`OUT` schema.

use logic_core_derive::Visit;

/// One of the primitive or container property types a script may declare.
#[derive(Debug, Clone, PartialEq, Eq, Visit)]
pub enum PropertyType {
    Bool,
    Int32,
    Int64,
    Float,
    String,
    Vec2F,
    Vec3F,
    Vec4F,
    Vec2I,
    Vec3I,
    Vec4I,
    /// Unordered-by-name container; children carry their own names.
    Struct,
    /// Fixed-length homogeneous container; `len` elements of `element`.
    Array { element: Box<PropertyType>, len: usize },
}

impl Default for PropertyType {
    fn default() -> Self {
        PropertyType::Bool
    }
}

impl PropertyType {
    /// True for every variant other than [`Self::Struct`]/[`Self::Array`].
    pub fn is_primitive(&self) -> bool {
        !matches!(self, PropertyType::Struct | PropertyType::Array { .. })
    }
}

/// One node of a schema tree extracted from a script's `interface()` (or declared by
/// a binding's fixed schema). Mirrors the shape of the `Property` tree it produces,
/// without any values.
#[derive(Debug, Clone, PartialEq, Eq, Default, Visit)]
pub struct TypeSchema {
    /// Empty for array elements, otherwise unique among siblings.
    pub name: String,
    pub ty: PropertyType,
    /// Non-empty only for `Struct`/`Array` types, in declaration (insertion) order.
    pub children: Vec<TypeSchema>,
}

impl TypeSchema {
    /// A leaf (primitive) schema node.
    pub fn leaf(name: impl Into<String>, ty: PropertyType) -> Self {
        debug_assert!(ty.is_primitive());
        Self {
            name: name.into(),
            ty,
            children: Vec::new(),
        }
    }

    /// A struct schema node with named children, in declaration order.
    pub fn strukt(name: impl Into<String>, children: Vec<TypeSchema>) -> Self {
        Self {
            name: name.into(),
            ty: PropertyType::Struct,
            children,
        }
    }

    /// An array schema node; every element shares `element_ty`.
    pub fn array(name: impl Into<String>, element_ty: PropertyType, children: Vec<TypeSchema>) -> Self {
        let len = children.len();
        Self {
            name: name.into(),
            ty: PropertyType::Array {
                element: Box::new(element_ty),
                len,
            },
            children,
        }
    }

    pub fn child(&self, name: &str) -> Option<&TypeSchema> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// The two property trees produced by evaluating a script's `interface()` once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceSchema {
    pub inputs: TypeSchema,
    pub outputs: TypeSchema,
}

//! The typed property tree (spec §3, §4.1).
//!
//! Every property a node owns - primitive or container - lives in one engine-wide
//! arena ([`PropertyStore`]) and is referred to only through a [`PropertyHandle`].
//! This is the "cyclic object graph -> arena + handles" re-architecture: a property's
//! parent and incoming link are handles looked up through the store, never raw
//! pointers, which is what makes the whole tree trivially serializable.

use logic_core::{Handle, Pool};
use logic_core_derive::Visit;
use logic_graph::NodeId;
use logic_script::{PropertyType, TypeSchema};

use crate::error::ValidationError;

/// A property in the arena. See [`PropertyStore`].
pub type PropertyHandle = Handle<PropertyRecord>;

/// The runtime-tagged value cell for a primitive property (spec's "closed sum type
/// over the ~13 primitive property types").
#[derive(Clone, Debug, PartialEq, Visit)]
pub enum PropertyValue {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float(f32),
    String(String),
    Vec2F(f32, f32),
    Vec3F(f32, f32, f32),
    Vec4F(f32, f32, f32, f32),
    Vec2I(i32, i32),
    Vec3I(i32, i32, i32),
    Vec4I(i32, i32, i32, i32),
}

impl Default for PropertyValue {
    fn default() -> Self {
        PropertyValue::Bool(false)
    }
}

impl PropertyValue {
    pub fn ty(&self) -> PropertyType {
        match self {
            PropertyValue::Bool(_) => PropertyType::Bool,
            PropertyValue::Int32(_) => PropertyType::Int32,
            PropertyValue::Int64(_) => PropertyType::Int64,
            PropertyValue::Float(_) => PropertyType::Float,
            PropertyValue::String(_) => PropertyType::String,
            PropertyValue::Vec2F(..) => PropertyType::Vec2F,
            PropertyValue::Vec3F(..) => PropertyType::Vec3F,
            PropertyValue::Vec4F(..) => PropertyType::Vec4F,
            PropertyValue::Vec2I(..) => PropertyType::Vec2I,
            PropertyValue::Vec3I(..) => PropertyType::Vec3I,
            PropertyValue::Vec4I(..) => PropertyType::Vec4I,
        }
    }
}

impl From<PropertyValue> for logic_script::ScriptValue {
    fn from(value: PropertyValue) -> Self {
        match value {
            PropertyValue::Bool(v) => logic_script::ScriptValue::Bool(v),
            PropertyValue::Int32(v) => logic_script::ScriptValue::Int32(v),
            PropertyValue::Int64(v) => logic_script::ScriptValue::Int64(v),
            PropertyValue::Float(v) => logic_script::ScriptValue::Float(v),
            PropertyValue::String(v) => logic_script::ScriptValue::String(v),
            PropertyValue::Vec2F(x, y) => logic_script::ScriptValue::Vec2F(x, y),
            PropertyValue::Vec3F(x, y, z) => logic_script::ScriptValue::Vec3F(x, y, z),
            PropertyValue::Vec4F(x, y, z, w) => logic_script::ScriptValue::Vec4F(x, y, z, w),
            PropertyValue::Vec2I(x, y) => logic_script::ScriptValue::Vec2I(x, y),
            PropertyValue::Vec3I(x, y, z) => logic_script::ScriptValue::Vec3I(x, y, z),
            PropertyValue::Vec4I(x, y, z, w) => logic_script::ScriptValue::Vec4I(x, y, z, w),
        }
    }
}

impl From<logic_script::ScriptValue> for PropertyValue {
    fn from(value: logic_script::ScriptValue) -> Self {
        match value {
            logic_script::ScriptValue::Bool(v) => PropertyValue::Bool(v),
            logic_script::ScriptValue::Int32(v) => PropertyValue::Int32(v),
            logic_script::ScriptValue::Int64(v) => PropertyValue::Int64(v),
            logic_script::ScriptValue::Float(v) => PropertyValue::Float(v),
            logic_script::ScriptValue::String(v) => PropertyValue::String(v),
            logic_script::ScriptValue::Vec2F(x, y) => PropertyValue::Vec2F(x, y),
            logic_script::ScriptValue::Vec3F(x, y, z) => PropertyValue::Vec3F(x, y, z),
            logic_script::ScriptValue::Vec4F(x, y, z, w) => PropertyValue::Vec4F(x, y, z, w),
            logic_script::ScriptValue::Vec2I(x, y) => PropertyValue::Vec2I(x, y),
            logic_script::ScriptValue::Vec3I(x, y, z) => PropertyValue::Vec3I(x, y, z),
            logic_script::ScriptValue::Vec4I(x, y, z, w) => PropertyValue::Vec4I(x, y, z, w),
        }
    }
}

/// A typed façade over [`PropertyValue`] so `get<T>`/`set<T>` can be generic while the
/// storage itself stays a closed sum type.
pub trait PropertyScalar: Sized {
    fn from_value(value: &PropertyValue) -> Option<Self>;
    fn into_value(self) -> PropertyValue;
    fn type_tag() -> PropertyType;
}

impl PropertyScalar for bool {
    fn from_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
    fn into_value(self) -> PropertyValue {
        PropertyValue::Bool(self)
    }
    fn type_tag() -> PropertyType {
        PropertyType::Bool
    }
}

impl PropertyScalar for i32 {
    fn from_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Int32(v) => Some(*v),
            _ => None,
        }
    }
    fn into_value(self) -> PropertyValue {
        PropertyValue::Int32(self)
    }
    fn type_tag() -> PropertyType {
        PropertyType::Int32
    }
}

impl PropertyScalar for i64 {
    fn from_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Int64(v) => Some(*v),
            _ => None,
        }
    }
    fn into_value(self) -> PropertyValue {
        PropertyValue::Int64(self)
    }
    fn type_tag() -> PropertyType {
        PropertyType::Int64
    }
}

impl PropertyScalar for f32 {
    fn from_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Float(v) => Some(*v),
            _ => None,
        }
    }
    fn into_value(self) -> PropertyValue {
        PropertyValue::Float(self)
    }
    fn type_tag() -> PropertyType {
        PropertyType::Float
    }
}

impl PropertyScalar for String {
    fn from_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::String(v) => Some(v.clone()),
            _ => None,
        }
    }
    fn into_value(self) -> PropertyValue {
        PropertyValue::String(self)
    }
    fn type_tag() -> PropertyType {
        PropertyType::String
    }
}

impl PropertyScalar for (f32, f32) {
    fn from_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Vec2F(x, y) => Some((*x, *y)),
            _ => None,
        }
    }
    fn into_value(self) -> PropertyValue {
        PropertyValue::Vec2F(self.0, self.1)
    }
    fn type_tag() -> PropertyType {
        PropertyType::Vec2F
    }
}

impl PropertyScalar for (f32, f32, f32) {
    fn from_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Vec3F(x, y, z) => Some((*x, *y, *z)),
            _ => None,
        }
    }
    fn into_value(self) -> PropertyValue {
        PropertyValue::Vec3F(self.0, self.1, self.2)
    }
    fn type_tag() -> PropertyType {
        PropertyType::Vec3F
    }
}

impl PropertyScalar for (f32, f32, f32, f32) {
    fn from_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Vec4F(x, y, z, w) => Some((*x, *y, *z, *w)),
            _ => None,
        }
    }
    fn into_value(self) -> PropertyValue {
        PropertyValue::Vec4F(self.0, self.1, self.2, self.3)
    }
    fn type_tag() -> PropertyType {
        PropertyType::Vec4F
    }
}

impl PropertyScalar for (i32, i32) {
    fn from_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Vec2I(x, y) => Some((*x, *y)),
            _ => None,
        }
    }
    fn into_value(self) -> PropertyValue {
        PropertyValue::Vec2I(self.0, self.1)
    }
    fn type_tag() -> PropertyType {
        PropertyType::Vec2I
    }
}

impl PropertyScalar for (i32, i32, i32) {
    fn from_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Vec3I(x, y, z) => Some((*x, *y, *z)),
            _ => None,
        }
    }
    fn into_value(self) -> PropertyValue {
        PropertyValue::Vec3I(self.0, self.1, self.2)
    }
    fn type_tag() -> PropertyType {
        PropertyType::Vec3I
    }
}

impl PropertyScalar for (i32, i32, i32, i32) {
    fn from_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Vec4I(x, y, z, w) => Some((*x, *y, *z, *w)),
            _ => None,
        }
    }
    fn into_value(self) -> PropertyValue {
        PropertyValue::Vec4I(self.0, self.1, self.2, self.3)
    }
    fn type_tag() -> PropertyType {
        PropertyType::Vec4I
    }
}

/// Marks which role a property plays: an input fed by a script, an output produced
/// by one, or an input mirroring a host-object field on a binding node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Visit)]
pub enum Semantics {
    ScriptInput,
    ScriptOutput,
    BindingInput,
}

impl Default for Semantics {
    fn default() -> Self {
        Semantics::ScriptInput
    }
}

/// One node of the property tree, stored in the engine-wide [`PropertyStore`] arena.
#[derive(Clone, Debug, Default)]
pub struct PropertyRecord {
    /// Empty for array elements and tree roots.
    pub name: String,
    pub ty: PropertyType,
    pub semantics: Semantics,
    pub owner: NodeId,
    pub parent: Option<PropertyHandle>,
    /// `Some` for primitives, `None` for struct/array containers.
    pub value: Option<PropertyValue>,
    /// Empty for primitives, in declaration order for containers.
    pub children: Vec<PropertyHandle>,
    /// Binding-only: set once by an explicit `set` or by `link`, and - per the fixed
    /// rule for the unlink/write-back open question - never cleared by `unlink`.
    pub write_back_flag: bool,
    /// Binding-only: the last value actually pushed to the host, for idempotence.
    pub last_written_to_host: Option<PropertyValue>,
}

impl PropertyType {
    fn display_name(&self) -> &'static str {
        match self {
            PropertyType::Bool => "bool",
            PropertyType::Int32 => "int32",
            PropertyType::Int64 => "int64",
            PropertyType::Float => "float",
            PropertyType::String => "string",
            PropertyType::Vec2F => "vec2f",
            PropertyType::Vec3F => "vec3f",
            PropertyType::Vec4F => "vec4f",
            PropertyType::Vec2I => "vec2i",
            PropertyType::Vec3I => "vec3i",
            PropertyType::Vec4I => "vec4i",
            PropertyType::Struct => "struct",
            PropertyType::Array { .. } => "array",
        }
    }
}

fn default_value_for(ty: &PropertyType) -> Option<PropertyValue> {
    Some(match ty {
        PropertyType::Bool => PropertyValue::Bool(false),
        PropertyType::Int32 => PropertyValue::Int32(0),
        PropertyType::Int64 => PropertyValue::Int64(0),
        PropertyType::Float => PropertyValue::Float(0.0),
        PropertyType::String => PropertyValue::String(String::new()),
        PropertyType::Vec2F => PropertyValue::Vec2F(0.0, 0.0),
        PropertyType::Vec3F => PropertyValue::Vec3F(0.0, 0.0, 0.0),
        PropertyType::Vec4F => PropertyValue::Vec4F(0.0, 0.0, 0.0, 0.0),
        PropertyType::Vec2I => PropertyValue::Vec2I(0, 0),
        PropertyType::Vec3I => PropertyValue::Vec3I(0, 0, 0),
        PropertyType::Vec4I => PropertyValue::Vec4I(0, 0, 0, 0),
        PropertyType::Struct | PropertyType::Array { .. } => return None,
    })
}

/// Matches child-lookup names "until first null byte", per the spec's invariant that
/// protects against embedded-null input names.
fn name_key(s: &str) -> &str {
    s.split('\0').next().unwrap_or("")
}

/// The engine-wide property arena plus the tree operations from spec §4.1.
#[derive(Debug, Default)]
pub struct PropertyStore {
    records: Pool<PropertyRecord>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self {
            records: Pool::new(),
        }
    }

    /// Builds a fresh property (sub)tree for `owner` from `schema`, recursively
    /// creating every struct/array child. Used both by script interface extraction
    /// and by binding nodes' fixed schemas.
    pub fn build_from_schema(
        &mut self,
        owner: NodeId,
        semantics: Semantics,
        parent: Option<PropertyHandle>,
        schema: &TypeSchema,
    ) -> PropertyHandle {
        let is_container = matches!(schema.ty, PropertyType::Struct | PropertyType::Array { .. });
        let value = if is_container {
            None
        } else {
            default_value_for(&schema.ty)
        };

        let handle = self.records.spawn(PropertyRecord {
            name: schema.name.clone(),
            ty: schema.ty.clone(),
            semantics,
            owner,
            parent,
            value,
            children: Vec::new(),
            write_back_flag: false,
            last_written_to_host: None,
        });

        if is_container {
            let children: Vec<PropertyHandle> = schema
                .children
                .iter()
                .map(|child_schema| {
                    self.build_from_schema(owner, semantics, Some(handle), child_schema)
                })
                .collect();
            self.records.borrow_mut(handle).children = children;
        }

        handle
    }

    /// Removes a whole (sub)tree from the arena, e.g. because its owning node was
    /// destroyed. Caller is responsible for severing links first.
    pub fn destroy_tree(&mut self, root: PropertyHandle) {
        let children = self.records.borrow(root).children.clone();
        for child in children {
            self.destroy_tree(child);
        }
        self.records.free(root);
    }

    pub fn ty(&self, handle: PropertyHandle) -> &PropertyType {
        &self.records.borrow(handle).ty
    }

    pub fn name(&self, handle: PropertyHandle) -> &str {
        &self.records.borrow(handle).name
    }

    pub fn owner(&self, handle: PropertyHandle) -> NodeId {
        self.records.borrow(handle).owner
    }

    pub fn semantics(&self, handle: PropertyHandle) -> Semantics {
        self.records.borrow(handle).semantics
    }

    pub fn parent(&self, handle: PropertyHandle) -> Option<PropertyHandle> {
        self.records.borrow(handle).parent
    }

    pub fn child_count(&self, handle: PropertyHandle) -> usize {
        self.records.borrow(handle).children.len()
    }

    pub fn child_at(&self, handle: PropertyHandle, index: usize) -> Option<PropertyHandle> {
        self.records.borrow(handle).children.get(index).copied()
    }

    pub fn child_by_name(&self, handle: PropertyHandle, name: &str) -> Option<PropertyHandle> {
        let key = name_key(name);
        self.records
            .borrow(handle)
            .children
            .iter()
            .copied()
            .find(|&child| name_key(&self.records.borrow(child).name) == key)
    }

    pub fn has_child(&self, handle: PropertyHandle, name: &str) -> bool {
        self.child_by_name(handle, name).is_some()
    }

    /// Returns the primitive value if `T` matches the stored type; `None` for
    /// containers or type mismatches.
    pub fn get<T: PropertyScalar>(&self, handle: PropertyHandle) -> Option<T> {
        self.records
            .borrow(handle)
            .value
            .as_ref()
            .and_then(T::from_value)
    }

    /// Raw, untyped access to the value cell (used by the link propagation path,
    /// which copies values between properties of statically-unknown-but-equal type).
    pub fn get_value(&self, handle: PropertyHandle) -> Option<&PropertyValue> {
        self.records.borrow(handle).value.as_ref()
    }

    /// Sets the primitive value directly, bypassing the linked-input and type checks
    /// that `set` performs. Used internally for link propagation and host write-back.
    pub fn set_value_unchecked(&mut self, handle: PropertyHandle, value: PropertyValue) {
        self.records.borrow_mut(handle).value = Some(value);
    }

    /// Public `set<T>`. Fails if `T` does not match the stored type, if the property
    /// is a container, or if `is_linked` is true (the caller must check that with the
    /// link registry and pass `false` for `is_linked` to let engine-internal
    /// propagation bypass this).
    pub fn set<T: PropertyScalar>(
        &mut self,
        handle: PropertyHandle,
        value: T,
        is_linked: bool,
    ) -> Result<(), ValidationError> {
        if is_linked {
            return Err(ValidationError::LinkedInputIsReadOnly);
        }
        let record = self.records.borrow(handle);
        if record.value.is_none() {
            return Err(ValidationError::ContainerNotAllowed);
        }
        if record.ty != T::type_tag() {
            return Err(ValidationError::TypeMismatch {
                expected: record.ty.display_name().to_string(),
                found: T::type_tag().display_name().to_string(),
            });
        }
        let record = self.records.borrow_mut(handle);
        record.value = Some(value.into_value());
        record.write_back_flag = true;
        Ok(())
    }

    pub fn mark_linked(&mut self, handle: PropertyHandle) {
        self.records.borrow_mut(handle).write_back_flag = true;
    }

    pub fn write_back_flag(&self, handle: PropertyHandle) -> bool {
        self.records.borrow(handle).write_back_flag
    }

    pub fn last_written_to_host(&self, handle: PropertyHandle) -> Option<&PropertyValue> {
        self.records.borrow(handle).last_written_to_host.as_ref()
    }

    pub fn record_written_to_host(&mut self, handle: PropertyHandle, value: PropertyValue) {
        self.records.borrow_mut(handle).last_written_to_host = Some(value);
    }

    pub fn is_valid(&self, handle: PropertyHandle) -> bool {
        self.records.is_valid_handle(handle)
    }

    /// Inserts a fully-formed record directly, bypassing schema-driven construction.
    /// Used when rebuilding a tree from its serialized form, where the shape and
    /// values are already known rather than derived from a [`TypeSchema`].
    pub fn insert_record(&mut self, record: PropertyRecord) -> PropertyHandle {
        self.records.spawn(record)
    }

    /// Overwrites a container's child list. Used alongside [`Self::insert_record`]
    /// when rebuilding a tree bottom-up: a parent record must exist before its
    /// children can name it as their `parent`, so the parent's `children` list is
    /// filled in only after they have all been inserted.
    pub fn set_children(&mut self, handle: PropertyHandle, children: Vec<PropertyHandle>) {
        self.records.borrow_mut(handle).children = children;
    }
}

/// Rejects an integer-from-float script assignment that would silently round.
pub fn checked_f64_to_i32(x: f64) -> Result<i32, ValidationError> {
    if x.fract() != 0.0 || x < i32::MIN as f64 || x > i32::MAX as f64 {
        return Err(ValidationError::WouldTruncate);
    }
    Ok(x as i32)
}

/// Rejects an integer-from-float script assignment that would silently round.
pub fn checked_f64_to_i64(x: f64) -> Result<i64, ValidationError> {
    if x.fract() != 0.0 || x < i64::MIN as f64 || x > i64::MAX as f64 {
        return Err(ValidationError::WouldTruncate);
    }
    Ok(x as i64)
}

#[cfg(test)]
mod test {
    use super::*;

    fn node() -> NodeId {
        NodeId::new(1)
    }

    #[test]
    fn struct_children_preserve_declaration_order() {
        let mut store = PropertyStore::new();
        let schema = TypeSchema::strukt(
            "IN",
            vec![
                TypeSchema::leaf("b", PropertyType::Int32),
                TypeSchema::leaf("a", PropertyType::Int32),
            ],
        );
        let root = store.build_from_schema(node(), Semantics::ScriptInput, None, &schema);
        assert_eq!(store.child_count(root), 2);
        assert_eq!(store.name(store.child_at(root, 0).unwrap()), "b");
        assert_eq!(store.name(store.child_at(root, 1).unwrap()), "a");
    }

    #[test]
    fn set_rejects_type_mismatch() {
        let mut store = PropertyStore::new();
        let schema = TypeSchema::leaf("x", PropertyType::Int32);
        let h = store.build_from_schema(node(), Semantics::ScriptInput, None, &schema);
        let err = store.set::<f32>(h, 1.0, false).unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { .. }));
    }

    #[test]
    fn set_rejects_linked_input() {
        let mut store = PropertyStore::new();
        let schema = TypeSchema::leaf("x", PropertyType::Int32);
        let h = store.build_from_schema(node(), Semantics::ScriptInput, None, &schema);
        let err = store.set::<i32>(h, 1, true).unwrap_err();
        assert_eq!(err, ValidationError::LinkedInputIsReadOnly);
    }

    #[test]
    fn set_rejects_container() {
        let mut store = PropertyStore::new();
        let schema = TypeSchema::strukt("IN", vec![]);
        let h = store.build_from_schema(node(), Semantics::ScriptInput, None, &schema);
        let err = store.set::<i32>(h, 1, false).unwrap_err();
        assert_eq!(err, ValidationError::ContainerNotAllowed);
    }

    #[test]
    fn child_lookup_stops_at_embedded_null() {
        let mut store = PropertyStore::new();
        let schema = TypeSchema::strukt("IN", vec![TypeSchema::leaf("abc\0def", PropertyType::Bool)]);
        let root = store.build_from_schema(node(), Semantics::ScriptInput, None, &schema);
        assert!(store.has_child(root, "abc"));
        assert!(store.has_child(root, "abc\0ghi"));
    }

    #[test]
    fn truncating_float_to_int_is_rejected() {
        assert!(checked_f64_to_i32(1.5).is_err());
        assert_eq!(checked_f64_to_i32(2.0).unwrap(), 2);
    }
}

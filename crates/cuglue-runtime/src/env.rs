//! Per-thread environment of the managed heap

use rustc_hash::FxHashMap;
use std::ffi::c_void;
use std::ptr::NonNull;

use cuglue_sdk::{
    BridgeError, BridgeResult, ClassRef, FieldId, GlobalRef, ManagedEnv, ManagedValue, MethodId,
    ObjectRef, PrimitiveKind, ReleaseMode,
};

use crate::heap::{FieldEntry, ManagedHeap, MethodEntry};
use crate::object::{Object, PrimitiveArray};

/// `ManagedEnv` implementation over a [`ManagedHeap`].
///
/// Critical views point straight into heap storage. Elements views are
/// copies, written back on `ReleaseMode::Commit`. Any runtime call made
/// while a critical view is held is counted in
/// [`ManagedHeap::critical_violations`].
pub struct HeapEnv {
    heap: ManagedHeap,
    critical_depth: usize,
    copies: Vec<(ObjectRef, PrimitiveArray)>,
}

impl HeapEnv {
    pub(crate) fn new(heap: ManagedHeap) -> Self {
        Self {
            heap,
            critical_depth: 0,
            copies: Vec::new(),
        }
    }

    /// The heap this environment belongs to
    pub fn heap(&self) -> &ManagedHeap {
        &self.heap
    }

    /// Raise an exception by class name from a method body. Returns the
    /// error the body should propagate.
    pub fn throw(&self, class: &str, message: &str) -> BridgeError {
        self.heap.set_pending(class, message);
        BridgeError::PendingException
    }

    /// Number of critical views currently held
    pub fn critical_depth(&self) -> usize {
        self.critical_depth
    }

    fn enter(&self) {
        if self.critical_depth > 0 {
            self.heap.record_critical_violation();
        }
    }

    fn mismatch(expected: &str, got: &Object) -> BridgeError {
        BridgeError::TypeMismatch {
            expected: expected.to_string(),
            got: got.type_name().to_string(),
        }
    }

    fn missing(obj: ObjectRef) -> BridgeError {
        BridgeError::Runtime(format!("no object {:?}", obj))
    }

    /// Run `f` on the storage of a primitive array of `kind`, or leave an
    /// exception pending
    fn with_array<R>(
        &self,
        array: ObjectRef,
        kind: PrimitiveKind,
        f: impl FnOnce(&mut PrimitiveArray) -> R,
    ) -> Option<R> {
        if self.heap.take_view_failure() {
            self.heap
                .set_pending("java/lang/OutOfMemoryError", "could not pin array");
            return None;
        }
        let result = match self.heap.state().objects.get_mut(&array) {
            Some(Object::Array(elems)) if elems.kind() == kind => Some(f(elems)),
            _ => None,
        };
        if result.is_none() {
            self.heap.set_pending(
                "java/lang/IllegalArgumentException",
                &format!("not a {}[]", kind.name()),
            );
        }
        result
    }
}

impl ManagedEnv for HeapEnv {
    fn find_class(&mut self, name: &str) -> BridgeResult<ClassRef> {
        self.enter();
        let found = {
            let state = self.heap.state();
            state
                .class_by_name
                .get(name)
                .map(|index| ClassRef::from_obj(state.class_objects[*index]))
        };
        found.ok_or_else(|| {
            self.heap.set_pending("java/lang/NoClassDefFoundError", name);
            BridgeError::Resolution {
                what: format!("class {}", name),
            }
        })
    }

    fn get_field_id(&mut self, class: ClassRef, name: &str, signature: &str) -> BridgeResult<FieldId> {
        self.enter();
        let found = {
            let mut state = self.heap.state();
            match state.class_index(class) {
                Some(index) if state.classes[index].field(name, signature) => {
                    let existing = state.fields.iter().position(|f| {
                        f.class == index && f.name == name && f.signature == signature
                    });
                    Some(existing.unwrap_or_else(|| {
                        state.fields.push(FieldEntry {
                            class: index,
                            name: name.to_string(),
                            signature: signature.to_string(),
                        });
                        state.fields.len() - 1
                    }))
                }
                _ => None,
            }
        };
        match found {
            Some(id) => Ok(FieldId(id as u64)),
            None => {
                self.heap.set_pending("java/lang/NoSuchFieldError", name);
                Err(BridgeError::Resolution {
                    what: format!("field {} {}", name, signature),
                })
            }
        }
    }

    fn get_method_id(&mut self, class: ClassRef, name: &str, signature: &str) -> BridgeResult<MethodId> {
        self.enter();
        let found = {
            let mut state = self.heap.state();
            match state.class_index(class) {
                Some(index) if state.classes[index].method(name, signature).is_some() => {
                    let existing = state.methods.iter().position(|m| {
                        m.class == index && m.name == name && m.signature == signature
                    });
                    Some(existing.unwrap_or_else(|| {
                        state.methods.push(MethodEntry {
                            class: index,
                            name: name.to_string(),
                            signature: signature.to_string(),
                        });
                        state.methods.len() - 1
                    }))
                }
                _ => None,
            }
        };
        match found {
            Some(id) => Ok(MethodId(id as u64)),
            None => {
                self.heap.set_pending("java/lang/NoSuchMethodError", name);
                Err(BridgeError::Resolution {
                    what: format!("method {} {}", name, signature),
                })
            }
        }
    }

    fn new_global_ref(&mut self, obj: ObjectRef) -> BridgeResult<GlobalRef> {
        self.enter();
        let mut state = self.heap.state();
        if !state.objects.contains_key(&obj) {
            return Err(Self::missing(obj));
        }
        if let Some(limit) = state.global_ref_limit {
            if state.live_global_refs() >= limit {
                drop(state);
                return Err(self.throw("java/lang/OutOfMemoryError", "global reference table full"));
            }
        }
        *state.globals.entry(obj).or_insert(0) += 1;
        Ok(GlobalRef::from_raw(obj))
    }

    fn delete_global_ref(&mut self, global: GlobalRef) {
        self.enter();
        let obj = global.into_raw();
        let mut state = self.heap.state();
        match state.globals.get(&obj).copied() {
            Some(count) if count > 1 => {
                state.globals.insert(obj, count - 1);
            }
            Some(_) => {
                state.globals.remove(&obj);
            }
            None => self.heap.record_invalid_global_delete(),
        }
    }

    fn throw_new(&mut self, class: ClassRef, message: &str) -> BridgeResult<()> {
        self.enter();
        let name = {
            let state = self.heap.state();
            state
                .class_index(class)
                .map(|index| state.classes[index].name.clone())
        };
        let name = name.ok_or_else(|| BridgeError::Runtime("throw of a non-class".to_string()))?;
        self.heap.set_pending(&name, message);
        Ok(())
    }

    fn exception_check(&mut self) -> bool {
        self.enter();
        self.heap.pending_exception().is_some()
    }

    fn exception_describe(&mut self) {
        self.enter();
        if let Some(exception) = self.heap.pending_exception() {
            eprintln!("Exception {}: {}", exception.class.replace('/', "."), exception.message);
            self.heap.state().described.push(exception);
        }
    }

    fn exception_clear(&mut self) {
        self.enter();
        self.heap.take_pending_exception();
    }

    fn new_object(
        &mut self,
        class: ClassRef,
        constructor: MethodId,
        args: &[ManagedValue],
    ) -> BridgeResult<ObjectRef> {
        self.enter();
        let (index, body) = {
            let state = self.heap.state();
            let index = state
                .class_index(class)
                .ok_or_else(|| BridgeError::Runtime("instantiation of a non-class".to_string()))?;
            let entry = state
                .methods
                .get(constructor.0 as usize)
                .filter(|m| m.class == index && m.name == "<init>")
                .ok_or_else(|| BridgeError::Runtime("not a constructor of this class".to_string()))?;
            let body = state.classes[index]
                .method(&entry.name, &entry.signature)
                .and_then(|m| m.body.clone());
            (index, body)
        };
        let Some(body) = body else {
            return Err(self.throw("java/lang/InstantiationError", "abstract constructor"));
        };
        let this = self.heap.alloc(Object::Instance {
            class: index,
            fields: FxHashMap::default(),
        });
        match body(self, this, args)? {
            ManagedValue::Object(Some(replacement)) => Ok(replacement),
            _ => Ok(this),
        }
    }

    fn call_method(
        &mut self,
        obj: ObjectRef,
        method: MethodId,
        args: &[ManagedValue],
    ) -> BridgeResult<ManagedValue> {
        self.enter();
        let body = {
            let state = self.heap.state();
            let entry = state
                .methods
                .get(method.0 as usize)
                .ok_or_else(|| BridgeError::Runtime(format!("unknown method id {}", method.0)))?;
            state
                .class_of(obj)
                .and_then(|class| state.classes[class].method(&entry.name, &entry.signature))
                .and_then(|m| m.body.clone())
                .ok_or_else(|| entry.name.clone())
        };
        match body {
            Ok(body) => body(self, obj, args),
            Err(name) => Err(self.throw("java/lang/NoSuchMethodError", &name)),
        }
    }

    fn get_long_field(&mut self, obj: ObjectRef, field: FieldId) -> BridgeResult<i64> {
        self.enter();
        let state = self.heap.state();
        let entry = state
            .fields
            .get(field.0 as usize)
            .ok_or_else(|| BridgeError::Runtime(format!("unknown field id {}", field.0)))?;
        if entry.signature != "J" {
            return Err(BridgeError::TypeMismatch {
                expected: "long".to_string(),
                got: entry.signature.clone(),
            });
        }
        match state.objects.get(&obj) {
            Some(Object::Instance { fields, .. }) => {
                Ok(fields.get(&entry.name).and_then(ManagedValue::as_long).unwrap_or(0))
            }
            Some(other) => Err(Self::mismatch("instance", other)),
            None => Err(Self::missing(obj)),
        }
    }

    fn set_long_field(&mut self, obj: ObjectRef, field: FieldId, value: i64) -> BridgeResult<()> {
        self.enter();
        let mut state = self.heap.state();
        let name = match state.fields.get(field.0 as usize) {
            Some(entry) if entry.signature == "J" => entry.name.clone(),
            Some(entry) => {
                return Err(BridgeError::TypeMismatch {
                    expected: "long".to_string(),
                    got: entry.signature.clone(),
                })
            }
            None => return Err(BridgeError::Runtime(format!("unknown field id {}", field.0))),
        };
        match state.objects.get_mut(&obj) {
            Some(Object::Instance { fields, .. }) => {
                fields.insert(name, ManagedValue::Long(value));
                Ok(())
            }
            Some(other) => Err(Self::mismatch("instance", other)),
            None => Err(Self::missing(obj)),
        }
    }

    fn array_length(&mut self, array: ObjectRef) -> BridgeResult<usize> {
        self.enter();
        match self.heap.state().objects.get(&array) {
            Some(Object::Array(elems)) => Ok(elems.len()),
            Some(Object::ObjectArray(elems)) => Ok(elems.len()),
            Some(other) => Err(Self::mismatch("array", other)),
            None => Err(Self::missing(array)),
        }
    }

    fn new_primitive_array(&mut self, kind: PrimitiveKind, len: usize) -> BridgeResult<ObjectRef> {
        self.enter();
        Ok(self.heap.alloc(Object::Array(PrimitiveArray::zeroed(kind, len))))
    }

    fn object_array_element(&mut self, array: ObjectRef, index: usize) -> BridgeResult<Option<ObjectRef>> {
        self.enter();
        let element = match self.heap.state().objects.get(&array) {
            Some(Object::ObjectArray(elems)) => elems.get(index).copied().ok_or(elems.len()),
            Some(other) => return Err(Self::mismatch("object[]", other)),
            None => return Err(Self::missing(array)),
        };
        element.map_err(|len| {
            self.throw(
                "java/lang/ArrayIndexOutOfBoundsException",
                &format!("Index {} out of bounds for length {}", index, len),
            )
        })
    }

    fn acquire_critical(&mut self, array: ObjectRef, kind: PrimitiveKind) -> Option<NonNull<c_void>> {
        self.enter();
        let ptr = self.with_array(array, kind, |elems| elems.as_mut_ptr())?;
        self.critical_depth += 1;
        NonNull::new(ptr.cast())
    }

    unsafe fn release_critical(&mut self, _array: ObjectRef, _elems: NonNull<c_void>, _mode: ReleaseMode) {
        // Views write straight into heap storage; there is nothing to copy.
        self.critical_depth = self.critical_depth.saturating_sub(1);
    }

    fn acquire_elements(&mut self, array: ObjectRef, kind: PrimitiveKind) -> Option<NonNull<c_void>> {
        self.enter();
        let mut copy = self.with_array(array, kind, |elems| elems.clone())?;
        let ptr = NonNull::new(copy.as_mut_ptr().cast::<c_void>())?;
        self.copies.push((array, copy));
        Some(ptr)
    }

    unsafe fn release_elements(&mut self, array: ObjectRef, elems: NonNull<c_void>, mode: ReleaseMode) {
        self.enter();
        let position = self
            .copies
            .iter_mut()
            .position(|(owner, copy)| *owner == array && copy.as_mut_ptr() == elems.as_ptr().cast());
        let Some(position) = position else {
            return;
        };
        let (_, copy) = self.copies.swap_remove(position);
        if mode == ReleaseMode::Commit {
            if let Some(Object::Array(target)) = self.heap.state().objects.get_mut(&array) {
                target.copy_from(&copy);
            }
        }
    }
}

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::arrays::ArrayKey;
use crate::cell::{Cell, VmError};
use crate::objects::{ClassData, ObjectData};
use crate::runtime::key::Key;
use crate::runtime::{Vm, diag};

/// Storage for the builtin typed collections. Unlike the generic array,
/// collections carry identity: no copy-on-write, and aliases observe each
/// other's writes. Keys are never folded ("10" and 10 stay distinct).
pub enum CollectionData {
    Vector(Mutex<Vec<Cell>>),
    Map(Mutex<HashMap<ArrayKey, Cell>>),
}

static VECTOR_CLASS: OnceLock<Arc<ClassData>> = OnceLock::new();
static MAP_CLASS: OnceLock<Arc<ClassData>> = OnceLock::new();

pub fn vector_class() -> Arc<ClassData> {
    VECTOR_CLASS
        .get_or_init(|| ClassData::new("Vector").into_arc())
        .clone()
}

pub fn map_class() -> Arc<ClassData> {
    MAP_CLASS
        .get_or_init(|| ClassData::new("Map").into_arc())
        .clone()
}

pub fn new_vector(items: Vec<Cell>) -> Arc<ObjectData> {
    ObjectData::new_collection(vector_class(), CollectionData::Vector(Mutex::new(items)))
}

pub fn new_map(entries: Vec<(ArrayKey, Cell)>) -> Arc<ObjectData> {
    ObjectData::new_collection(
        map_class(),
        CollectionData::Map(Mutex::new(entries.into_iter().collect())),
    )
}

fn storage(obj: &ObjectData) -> &CollectionData {
    obj.collection()
        .unwrap_or_else(|| panic!("collection op on non-collection {:?}", obj))
}

fn vector_index(vm: &mut Vm, key: &Key) -> Result<i64, VmError> {
    match key {
        Key::Int(i) => Ok(*i),
        Key::Any(Cell::Int(i)) => Ok(*i),
        _ => Err(vm.raise_error(diag::VECTOR_INT_KEYS)),
    }
}

fn map_key(vm: &mut Vm, key: &Key) -> Result<ArrayKey, VmError> {
    match key {
        Key::Int(i) => Ok(ArrayKey::Int(*i)),
        Key::Str(s) => Ok(ArrayKey::Str(s.clone())),
        Key::Any(Cell::Int(i)) => Ok(ArrayKey::Int(*i)),
        Key::Any(Cell::Str(s) | Cell::StaticStr(s)) => Ok(ArrayKey::Str(s.clone())),
        Key::Any(_) => Err(vm.raise_error(diag::MAP_KEY_TYPES)),
    }
}

fn vector_oob(vm: &mut Vm, i: i64) -> VmError {
    vm.raise_error(format!("Integer key {} is out of bounds", i))
}

fn map_missing(vm: &mut Vm, key: &ArrayKey) -> VmError {
    match key {
        ArrayKey::Int(i) => vm.raise_error(format!("Integer key {} is out of bounds", i)),
        ArrayKey::Str(s) => vm.raise_error(format!("Key \"{}\" is not defined", s)),
    }
}

/// Read without a miss error; `None` when the key is absent.
pub fn get(vm: &mut Vm, obj: &ObjectData, key: &Key) -> Result<Option<Cell>, VmError> {
    match storage(obj) {
        CollectionData::Vector(items) => {
            let i = vector_index(vm, key)?;
            let items = items.lock();
            Ok(usize::try_from(i).ok().and_then(|i| items.get(i).cloned()))
        }
        CollectionData::Map(entries) => {
            let k = map_key(vm, key)?;
            Ok(entries.lock().get(&k).cloned())
        }
    }
}

/// Read with an out-of-bounds error on a miss.
pub fn at(vm: &mut Vm, obj: &ObjectData, key: &Key) -> Result<Cell, VmError> {
    match storage(obj) {
        CollectionData::Vector(items) => {
            let i = vector_index(vm, key)?;
            let items = items.lock();
            usize::try_from(i)
                .ok()
                .and_then(|i| items.get(i).cloned())
                .ok_or_else(|| vector_oob(vm, i))
        }
        CollectionData::Map(entries) => {
            let k = map_key(vm, key)?;
            let entries = entries.lock();
            match entries.get(&k) {
                Some(c) => Ok(c.clone()),
                None => Err(map_missing(vm, &k)),
            }
        }
    }
}

/// Lvalue into existing storage; missing keys error like [`at`]. The guard
/// must be dropped before the next member op on this collection.
pub fn at_lval<'a>(
    vm: &mut Vm,
    obj: &'a ObjectData,
    key: &Key,
) -> Result<MappedMutexGuard<'a, Cell>, VmError> {
    match storage(obj) {
        CollectionData::Vector(items) => {
            let i = vector_index(vm, key)?;
            let guard = items.lock();
            MutexGuard::try_map(guard, |items| {
                usize::try_from(i).ok().and_then(|i| items.get_mut(i))
            })
            .map_err(|_| vector_oob(vm, i))
        }
        CollectionData::Map(entries) => {
            let k = map_key(vm, key)?;
            let guard = entries.lock();
            MutexGuard::try_map(guard, |entries| entries.get_mut(&k))
                .map_err(|_| map_missing(vm, &k))
        }
    }
}

/// Read-modify-write lvalue; same rules as [`at_lval`].
pub fn at_rw<'a>(
    vm: &mut Vm,
    obj: &'a ObjectData,
    key: &Key,
) -> Result<MappedMutexGuard<'a, Cell>, VmError> {
    at_lval(vm, obj, key)
}

pub fn set(vm: &mut Vm, obj: &ObjectData, key: &Key, value: Cell) -> Result<(), VmError> {
    match storage(obj) {
        CollectionData::Vector(items) => {
            let i = vector_index(vm, key)?;
            let mut items = items.lock();
            match usize::try_from(i).ok().filter(|&i| i < items.len()) {
                Some(i) => {
                    items[i] = value;
                    Ok(())
                }
                None => Err(vector_oob(vm, i)),
            }
        }
        CollectionData::Map(entries) => {
            let k = map_key(vm, key)?;
            entries.lock().insert(k, value);
            Ok(())
        }
    }
}

pub fn append(vm: &mut Vm, obj: &ObjectData, value: Cell) -> Result<(), VmError> {
    match storage(obj) {
        CollectionData::Vector(items) => {
            items.lock().push(value);
            Ok(())
        }
        CollectionData::Map(_) => Err(vm.raise_error("Cannot append to a Map without a key")),
    }
}

/// isset: present and non-null.
pub fn isset(vm: &mut Vm, obj: &ObjectData, key: &Key) -> Result<bool, VmError> {
    Ok(get(vm, obj, key)?.is_some_and(|c| !c.is_null()))
}

/// empty: absent or falsy.
pub fn empty(vm: &mut Vm, obj: &ObjectData, key: &Key) -> Result<bool, VmError> {
    Ok(!get(vm, obj, key)?.is_some_and(|c| c.to_bool()))
}

pub fn unset(vm: &mut Vm, obj: &ObjectData, key: &Key) -> Result<(), VmError> {
    match storage(obj) {
        CollectionData::Vector(_) => Err(vm.raise_error(diag::VECTOR_UNSET)),
        CollectionData::Map(entries) => {
            let k = map_key(vm, key)?;
            entries.lock().remove(&k);
            Ok(())
        }
    }
}

/// Snapshot of a vector's items (test/host support).
pub fn vector_items(obj: &ObjectData) -> Vec<Cell> {
    match storage(obj) {
        CollectionData::Vector(items) => items.lock().clone(),
        CollectionData::Map(_) => panic!("vector_items on a Map"),
    }
}

/// Snapshot of a map's entries (test/host support).
pub fn map_entries(obj: &ObjectData) -> HashMap<ArrayKey, Cell> {
    match storage(obj) {
        CollectionData::Map(entries) => entries.lock().clone(),
        CollectionData::Vector(_) => panic!("map_entries on a Vector"),
    }
}

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::cell::{Cell, VmError};
use crate::collections::CollectionData;
use crate::runtime::{Vm, diag};
use crate::symbol::Symbol;

static INSTANCE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_instance_id() -> u64 {
    INSTANCE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

impl Visibility {
    fn label(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        }
    }
}

/// The userland subscript-operator protocol. An object whose class carries
/// a handler can be indexed like an array; the member core materializes
/// reads into the caller's scratch cell and routes writes through here.
///
/// Handlers may re-enter any member operation; the core finishes its own
/// bookkeeping before calling out.
pub trait SubscriptHandler: Send + Sync {
    fn offset_get(&self, vm: &mut Vm, this: &Arc<ObjectData>, offset: &Cell)
    -> Result<Cell, VmError>;
    fn offset_set(
        &self,
        vm: &mut Vm,
        this: &Arc<ObjectData>,
        offset: &Cell,
        value: &Cell,
    ) -> Result<(), VmError>;
    fn offset_isset(
        &self,
        vm: &mut Vm,
        this: &Arc<ObjectData>,
        offset: &Cell,
    ) -> Result<bool, VmError>;
    fn offset_unset(&self, vm: &mut Vm, this: &Arc<ObjectData>, offset: &Cell)
    -> Result<(), VmError>;
    fn offset_append(&self, vm: &mut Vm, this: &Arc<ObjectData>, value: &Cell)
    -> Result<(), VmError>;
}

/// Class metadata: the name, the declared property table with visibility,
/// and the two capabilities the member core dispatches on (subscript
/// handler, array-object adapter).
pub struct ClassData {
    name: String,
    declared: HashMap<Symbol, Visibility>,
    array_object: bool,
    handler: Option<Arc<dyn SubscriptHandler>>,
}

impl ClassData {
    pub fn new(name: &str) -> ClassData {
        ClassData {
            name: name.to_string(),
            declared: HashMap::new(),
            array_object: false,
            handler: None,
        }
    }

    pub fn declare(mut self, name: &str, visibility: Visibility) -> ClassData {
        self.declared.insert(Symbol::intern(name), visibility);
        self
    }

    pub fn with_subscript_handler(mut self, handler: Arc<dyn SubscriptHandler>) -> ClassData {
        self.handler = Some(handler);
        self
    }

    /// Mark this class as the array-object adapter: define-mode element
    /// reads are routed into its internal `storage` array property.
    pub fn as_array_object(mut self) -> ClassData {
        self.array_object = true;
        self
    }

    pub fn into_arc(self) -> Arc<ClassData> {
        Arc::new(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_array_object(&self) -> bool {
        self.array_object
    }

    pub fn subscript_handler(&self) -> Option<&Arc<dyn SubscriptHandler>> {
        self.handler.as_ref()
    }

    fn declared_visibility(&self, name: Symbol) -> Option<Visibility> {
        self.declared.get(&name).copied()
    }
}

impl fmt::Debug for ClassData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassData")
            .field("name", &self.name)
            .field("array_object", &self.array_object)
            .finish()
    }
}

static STDCLASS: OnceLock<Arc<ClassData>> = OnceLock::new();

/// The system's empty-object class, the target of property
/// auto-vivification.
pub fn stdclass() -> Arc<ClassData> {
    STDCLASS
        .get_or_init(|| ClassData::new("stdclass").into_arc())
        .clone()
}

pub(crate) fn storage_symbol() -> Symbol {
    Symbol::intern("storage")
}

pub enum ObjectKind {
    Plain,
    Collection(CollectionData),
}

/// An object instance: identity-carrying (aliases observe each other's
/// writes), with a mutable property table and an optional typed-collection
/// payload.
pub struct ObjectData {
    class: Arc<ClassData>,
    props: Mutex<HashMap<Symbol, Cell>>,
    kind: ObjectKind,
    id: u64,
}

enum PropAccess {
    Visible,
    Inaccessible(Visibility),
    Undeclared,
}

impl ObjectData {
    pub fn new(class: Arc<ClassData>) -> Arc<ObjectData> {
        Arc::new(ObjectData {
            class,
            props: Mutex::new(HashMap::new()),
            kind: ObjectKind::Plain,
            id: next_instance_id(),
        })
    }

    pub fn new_collection(class: Arc<ClassData>, data: CollectionData) -> Arc<ObjectData> {
        Arc::new(ObjectData {
            class,
            props: Mutex::new(HashMap::new()),
            kind: ObjectKind::Collection(data),
            id: next_instance_id(),
        })
    }

    pub fn class(&self) -> &Arc<ClassData> {
        &self.class
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.kind, ObjectKind::Collection(_))
    }

    pub(crate) fn collection(&self) -> Option<&CollectionData> {
        match &self.kind {
            ObjectKind::Collection(c) => Some(c),
            ObjectKind::Plain => None,
        }
    }

    fn prop_access(&self, ctx: Option<&Arc<ClassData>>, name: Symbol) -> PropAccess {
        match self.class.declared_visibility(name) {
            None => PropAccess::Undeclared,
            Some(Visibility::Public) => PropAccess::Visible,
            Some(vis) => match ctx {
                Some(ctx) if Arc::ptr_eq(ctx, &self.class) => PropAccess::Visible,
                _ => PropAccess::Inaccessible(vis),
            },
        }
    }

    fn inaccessible_error(&self, vm: &mut Vm, vis: Visibility, name: Symbol) -> VmError {
        vm.raise_error(format!(
            "Cannot access {} property {}::${}",
            vis.label(),
            self.class.name,
            name
        ))
    }

    /// Read a property by value; missing or invisible-by-scope slots read
    /// as null (invisible declared properties are a fatal instead).
    /// `warn` adds the undefined-property notice on a miss.
    pub fn read_prop(
        &self,
        vm: &mut Vm,
        ctx: Option<&Arc<ClassData>>,
        name: Symbol,
        warn: bool,
    ) -> Result<Cell, VmError> {
        if let PropAccess::Inaccessible(vis) = self.prop_access(ctx, name) {
            return Err(self.inaccessible_error(vm, vis, name));
        }
        match self.props.lock().get(&name) {
            Some(cell) => Ok(cell.clone()),
            None => {
                if warn {
                    vm.raise_notice(format!(
                        "{}: {}::${}",
                        diag::UNDEFINED_PROPERTY,
                        self.class.name,
                        name
                    ));
                }
                Ok(Cell::Null)
            }
        }
    }

    /// Lvalue lookup into the property table, creating the slot as null if
    /// missing. The returned guard must be dropped before the next member
    /// op on this object.
    pub fn prop_d(
        &self,
        vm: &mut Vm,
        ctx: Option<&Arc<ClassData>>,
        name: Symbol,
        warn: bool,
    ) -> Result<MappedMutexGuard<'_, Cell>, VmError> {
        if let PropAccess::Inaccessible(vis) = self.prop_access(ctx, name) {
            return Err(self.inaccessible_error(vm, vis, name));
        }
        let guard = self.props.lock();
        if warn && !guard.contains_key(&name) {
            vm.raise_notice(format!(
                "{}: {}::${}",
                diag::UNDEFINED_PROPERTY,
                self.class.name,
                name
            ));
        }
        Ok(MutexGuard::map(guard, |props| {
            props.entry(name).or_insert(Cell::Null)
        }))
    }

    pub fn set_prop(
        &self,
        vm: &mut Vm,
        ctx: Option<&Arc<ClassData>>,
        name: Symbol,
        value: Cell,
    ) -> Result<(), VmError> {
        if let PropAccess::Inaccessible(vis) = self.prop_access(ctx, name) {
            return Err(self.inaccessible_error(vm, vis, name));
        }
        self.props.lock().insert(name, value);
        Ok(())
    }

    pub fn unset_prop(
        &self,
        vm: &mut Vm,
        ctx: Option<&Arc<ClassData>>,
        name: Symbol,
    ) -> Result<(), VmError> {
        if let PropAccess::Inaccessible(vis) = self.prop_access(ctx, name) {
            return Err(self.inaccessible_error(vm, vis, name));
        }
        self.props.lock().remove(&name);
        Ok(())
    }

    /// isset semantics: present, visible and non-null. Invisible slots
    /// report false rather than erroring.
    pub fn prop_isset(&self, ctx: Option<&Arc<ClassData>>, name: Symbol) -> bool {
        match self.prop_access(ctx, name) {
            PropAccess::Inaccessible(_) => false,
            _ => matches!(self.props.lock().get(&name), Some(c) if !c.is_null()),
        }
    }

    /// empty semantics: absent, invisible or falsy.
    pub fn prop_empty(&self, ctx: Option<&Arc<ClassData>>, name: Symbol) -> bool {
        match self.prop_access(ctx, name) {
            PropAccess::Inaccessible(_) => true,
            _ => !self
                .props
                .lock()
                .get(&name)
                .is_some_and(|c| c.to_bool()),
        }
    }

    /// Snapshot of the property table, for hosts that need to enumerate.
    pub fn props_snapshot(&self) -> HashMap<Symbol, Cell> {
        self.props.lock().clone()
    }
}

impl fmt::Debug for ObjectData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectData({}#{})", self.class.name, self.id)
    }
}

fn handler_of<'a>(vm: &mut Vm, obj: &'a ObjectData) -> Result<&'a Arc<dyn SubscriptHandler>, VmError> {
    match obj.class.subscript_handler() {
        Some(h) => Ok(h),
        None => Err(vm.raise_error(format!(
            "Cannot use object of type {} as array",
            obj.class.name
        ))),
    }
}

/// `obj[offset]` through the subscript protocol.
pub fn obj_offset_get(vm: &mut Vm, obj: &Arc<ObjectData>, offset: &Cell) -> Result<Cell, VmError> {
    let handler = handler_of(vm, obj)?.clone();
    handler.offset_get(vm, obj, offset)
}

pub fn obj_offset_set(
    vm: &mut Vm,
    obj: &Arc<ObjectData>,
    offset: &Cell,
    value: &Cell,
) -> Result<(), VmError> {
    let handler = handler_of(vm, obj)?.clone();
    handler.offset_set(vm, obj, offset, value)
}

pub fn obj_offset_isset(
    vm: &mut Vm,
    obj: &Arc<ObjectData>,
    offset: &Cell,
) -> Result<bool, VmError> {
    let handler = handler_of(vm, obj)?.clone();
    handler.offset_isset(vm, obj, offset)
}

/// empty() through the protocol: absent, or present-but-falsy.
pub fn obj_offset_empty(
    vm: &mut Vm,
    obj: &Arc<ObjectData>,
    offset: &Cell,
) -> Result<bool, VmError> {
    let handler = handler_of(vm, obj)?.clone();
    if !handler.offset_isset(vm, obj, offset)? {
        return Ok(true);
    }
    Ok(!handler.offset_get(vm, obj, offset)?.to_bool())
}

pub fn obj_offset_unset(vm: &mut Vm, obj: &Arc<ObjectData>, offset: &Cell) -> Result<(), VmError> {
    let handler = handler_of(vm, obj)?.clone();
    handler.offset_unset(vm, obj, offset)
}

pub fn obj_offset_append(vm: &mut Vm, obj: &Arc<ObjectData>, value: &Cell) -> Result<(), VmError> {
    let handler = handler_of(vm, obj)?.clone();
    handler.offset_append(vm, obj, value)
}

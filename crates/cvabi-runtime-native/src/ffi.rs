#![allow(non_camel_case_types)]
#![allow(clippy::missing_safety_doc)]

use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use cvabi_descriptor::{
    parse_header, FieldId, FieldKind, FieldValue, TableCatalog, Validation, VendorRegistry,
};
use once_cell::sync::Lazy;
use tracing::warn;

use crate::dispatch::{dispatch, Violation};
use crate::{
    config, DetectionMode, Dispatch, DispatchGate, EvaluationSemantic, TerminationReason,
    ViolationHandler, ViolationView,
};

#[repr(C)]
#[derive(Copy, Clone)]
pub struct cvabi_bytes_view_v1 {
    pub ptr: *const u8,
    pub len: u32,
}

/// Opaque handle to the view a handler receives.
#[repr(C)]
pub struct cvabi_violation_v1 {
    _private: [u8; 0],
}

pub const CVABI_VALUE_NONE: u8 = 0;
pub const CVABI_VALUE_POINTER: u8 = 1;
pub const CVABI_VALUE_U8: u8 = 2;
pub const CVABI_VALUE_U16: u8 = 3;
pub const CVABI_VALUE_U32: u8 = 4;
pub const CVABI_VALUE_U64: u8 = 5;
pub const CVABI_VALUE_BYTES: u8 = 6;

/// A decoded field. Integers and pointers land in `value`; raw dynamic
/// payloads in `bytes`, valid only while the handler runs.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct cvabi_field_value_v1 {
    pub kind: u8,
    pub reserved: [u8; 7],
    pub value: u64,
    pub bytes: cvabi_bytes_view_v1,
}

impl cvabi_field_value_v1 {
    const NONE: Self = Self {
        kind: CVABI_VALUE_NONE,
        reserved: [0; 7],
        value: 0,
        bytes: cvabi_bytes_view_v1 {
            ptr: std::ptr::null(),
            len: 0,
        },
    };

    fn from_value(v: FieldValue<'_>) -> Self {
        let (kind, value) = match v {
            FieldValue::Pointer(p) => (CVABI_VALUE_POINTER, p as u64),
            FieldValue::U8(v) => (CVABI_VALUE_U8, v as u64),
            FieldValue::U16(v) => (CVABI_VALUE_U16, v as u64),
            FieldValue::U32(v) => (CVABI_VALUE_U32, v as u64),
            FieldValue::U64(v) => (CVABI_VALUE_U64, v),
            FieldValue::Bytes(b) => {
                return Self {
                    kind: CVABI_VALUE_BYTES,
                    bytes: cvabi_bytes_view_v1 {
                        ptr: b.as_ptr(),
                        len: b.len() as u32,
                    },
                    ..Self::NONE
                };
            }
        };
        Self {
            kind,
            value,
            ..Self::NONE
        }
    }
}

/// One vendor field declaration: `kind` uses the `CVABI_VALUE_*` codes
/// `POINTER` through `U64`.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct cvabi_vendor_field_v1 {
    pub local_id: u8,
    pub kind: u8,
}

pub type cvabi_handler_v1 = extern "C" fn(view: *const cvabi_violation_v1);

static HANDLER: RwLock<Option<cvabi_handler_v1>> = RwLock::new(None);
/// Published registry snapshot. Readers clone the `Arc` and release the lock
/// before dispatching; registration swaps in a new snapshot.
static VENDORS: Lazy<RwLock<Arc<VendorRegistry>>> =
    Lazy::new(|| RwLock::new(Arc::new(VendorRegistry::new())));

fn vendors_snapshot() -> Arc<VendorRegistry> {
    Arc::clone(&VENDORS.read().unwrap_or_else(|e| e.into_inner()))
}

struct ThreadContext {
    gate: DispatchGate,
}

thread_local! {
    static CONTEXT: ThreadContext = const {
        ThreadContext {
            gate: DispatchGate::new(),
        }
    };
}

struct InstalledHandler(Option<cvabi_handler_v1>);

impl ViolationHandler for InstalledHandler {
    fn handle(&self, view: &ViolationView<'_>) {
        match self.0 {
            Some(h) => h((view as *const ViolationView<'_>).cast::<cvabi_violation_v1>()),
            None => crate::handler::default_handler(view),
        }
    }
}

fn kind_from_code(code: u8) -> Option<FieldKind> {
    match code {
        CVABI_VALUE_POINTER => Some(FieldKind::Pointer),
        CVABI_VALUE_U8 => Some(FieldKind::U8),
        CVABI_VALUE_U16 => Some(FieldKind::U16),
        CVABI_VALUE_U32 => Some(FieldKind::U32),
        CVABI_VALUE_U64 => Some(FieldKind::U64),
        _ => None,
    }
}

unsafe fn bytes_as_slice<'a>(ptr: *const u8, len: usize) -> &'a [u8] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, len)
    }
}

const C_STRING_MAX: usize = 4096;

/// Reads a NUL-terminated string of at most 4 KiB.
pub(crate) unsafe fn read_c_string(addr: usize) -> Option<String> {
    let base = addr as *const u8;
    if base.is_null() {
        return None;
    }
    let mut len = 0;
    while len < C_STRING_MAX && *base.add(len) != 0 {
        len += 1;
    }
    let bytes = std::slice::from_raw_parts(base, len);
    Some(String::from_utf8_lossy(bytes).into_owned())
}

unsafe fn handle_violation(
    descriptor: *const u8,
    descriptor_len: u32,
    data: *const u8,
    detection_mode: u8,
    semantic: u8,
    tlv: *const cvabi_bytes_view_v1,
) -> Dispatch {
    let mode = config::validation();

    let descriptor = (!descriptor.is_null() && descriptor_len > 0)
        .then(|| bytes_as_slice(descriptor, descriptor_len as usize));
    // The blob's extent comes from the header; without a readable header no
    // static field can resolve.
    let data_len = descriptor
        .and_then(|d| parse_header(d, Validation::Trusting).ok())
        .map(|h| h.data_size as usize)
        .unwrap_or(0);
    let data = bytes_as_slice(data, data_len);
    let dynamic = tlv
        .as_ref()
        .map(|v| bytes_as_slice(v.ptr, v.len as usize));

    let violation = Violation {
        descriptor,
        data,
        detection: DetectionMode::from_raw(detection_mode),
        semantic: EvaluationSemantic::from_raw(semantic),
        dynamic,
    };
    // Neither lock may be held while the handler runs.
    let handler = InstalledHandler(*HANDLER.read().unwrap_or_else(|e| e.into_inner()));
    let vendors = vendors_snapshot();

    CONTEXT.with(|ctx| dispatch(&ctx.gate, violation, mode, &vendors, &handler))
}

/// Reports a contract violation. Returns only when the outcome allows the
/// program to continue; otherwise the process aborts.
#[no_mangle]
pub unsafe extern "C" fn cvabi_handle_violation_v1(
    descriptor: *const u8,
    descriptor_len: u32,
    data: *const u8,
    detection_mode: u8,
    semantic: u8,
    tlv: *const cvabi_bytes_view_v1,
    _reserved: *const c_void,
) {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        handle_violation(descriptor, descriptor_len, data, detection_mode, semantic, tlv)
    }))
    .unwrap_or(Dispatch::Terminate(TerminationReason::HandlerPanicked));

    if let Dispatch::Terminate(reason) = outcome {
        warn!(reason = reason.as_str(), "terminating after contract violation");
        std::process::abort();
    }
}

#[no_mangle]
pub unsafe extern "C" fn cvabi_get_field_v1(
    view: *const cvabi_violation_v1,
    field_id: u16,
    out: *mut cvabi_field_value_v1,
) -> bool {
    let Some(view) = view.cast::<ViolationView<'_>>().as_ref() else {
        return false;
    };
    let value = view.get(FieldId(field_id));
    if let Some(out) = out.as_mut() {
        *out = match value {
            Some(v) => cvabi_field_value_v1::from_value(v),
            None => cvabi_field_value_v1::NONE,
        };
    }
    value.is_some()
}

#[no_mangle]
pub unsafe extern "C" fn cvabi_violation_detection_mode_v1(view: *const cvabi_violation_v1) -> u8 {
    match view.cast::<ViolationView<'_>>().as_ref() {
        Some(view) => view.detection_mode().raw(),
        None => 0,
    }
}

#[no_mangle]
pub unsafe extern "C" fn cvabi_violation_semantic_v1(view: *const cvabi_violation_v1) -> u8 {
    match view.cast::<ViolationView<'_>>().as_ref() {
        Some(view) => view.semantic().raw(),
        None => EvaluationSemantic::Enforce.raw(),
    }
}

/// Installs `handler` (null restores the default) and returns the previous
/// one.
#[no_mangle]
pub extern "C" fn cvabi_set_handler_v1(
    handler: Option<cvabi_handler_v1>,
) -> Option<cvabi_handler_v1> {
    let mut slot = HANDLER.write().unwrap_or_else(|e| e.into_inner());
    std::mem::replace(&mut *slot, handler)
}

/// `0` restores the environment/build default, `1` forces hardened and `2`
/// trusting validation. Returns false for any other value.
#[no_mangle]
pub extern "C" fn cvabi_set_validation_v1(mode: u8) -> bool {
    let mode = match mode {
        0 => None,
        1 => Some(Validation::Hardened),
        2 => Some(Validation::Trusting),
        _ => return false,
    };
    config::set_validation(mode);
    true
}

/// Registers the field catalog for `vendor`, replacing any earlier one.
/// Returns false when a declaration has an unknown kind. Violations already
/// being handled keep the catalogs they started with.
#[no_mangle]
pub unsafe extern "C" fn cvabi_register_vendor_catalog_v1(
    vendor: u8,
    fields: *const cvabi_vendor_field_v1,
    count: u32,
) -> bool {
    let decls: &[cvabi_vendor_field_v1] = if fields.is_null() || count == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(fields, count as usize)
    };
    let mut catalog = TableCatalog::new();
    for d in decls {
        let Some(kind) = kind_from_code(d.kind) else {
            return false;
        };
        catalog = catalog.with_field(d.local_id, format!("vendor_{:02x}", d.local_id), kind);
    }
    let mut slot = VENDORS.write().unwrap_or_else(|e| e.into_inner());
    let mut next = VendorRegistry::clone(&slot);
    next.register(vendor, catalog);
    *slot = Arc::new(next);
    true
}

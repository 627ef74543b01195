use cocoa::base::id;
use std::ffi::{c_void, CStr};
use std::os::raw::c_char;

pub const K_TIS_PROPERTY_INPUT_SOURCE_ID: &str = "TISPropertyInputSourceID";
pub const K_TIS_PROPERTY_INPUT_SOURCE_TYPE: &str = "TISPropertyInputSourceType";
pub const K_TIS_PROPERTY_LOCALIZED_NAME: &str = "TISPropertyLocalizedName";
pub const K_TIS_PROPERTY_IS_SELECT_CAPABLE: &str = "TISPropertyInputSourceIsSelectCapable";
pub const K_TIS_PROPERTY_IS_ENABLED: &str = "TISPropertyInputSourceIsEnabled";
pub const K_TIS_NOTIFY_ENABLED_SOURCES_CHANGED: &str =
    "com.apple.Carbon.TISNotifyEnabledKeyboardInputSourcesChanged";
pub const K_TIS_NOTIFY_SELECTED_SOURCE_CHANGED: &str =
    "com.apple.Carbon.TISNotifySelectedKeyboardInputSourceChanged";
pub const K_UTF8_ENCODING: u32 = 0x08000100;

pub const NO_ERR: i32 = 0;
pub const K_EVENT_CLASS_KEYBOARD: u32 = 0x6B65_7962; // 'keyb'
pub const K_EVENT_HOTKEY_PRESSED: u32 = 6;

pub type EventTargetRef = *mut c_void;
pub type EventHandlerRef = *mut c_void;
pub type EventHandlerCallRef = *mut c_void;
pub type EventRef = *mut c_void;
pub type EventHotKeyRef = *mut c_void;
pub type EventHandlerUPP = extern "C" fn(EventHandlerCallRef, EventRef, *mut c_void) -> i32;

#[repr(C)]
#[derive(Copy, Clone)]
pub struct EventTypeSpec {
    pub event_class: u32,
    pub event_kind: u32,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct EventHotKeyID {
    pub signature: u32,
    pub id: u32,
}

#[allow(non_snake_case)]
extern "C" {
    pub fn TISCopyCurrentKeyboardInputSource() -> id;
    pub fn TISGetInputSourceProperty(input_source: id, property_key: id) -> id;
    pub fn TISSelectInputSource(input_source: id) -> i32;
    pub fn TISCreateInputSourceList(properties: id, include_all_installed: bool) -> id;
    pub fn CFStringGetCString(
        the_string: id,
        buffer: *mut c_char,
        buffer_size: isize,
        encoding: u32,
    ) -> bool;
    pub fn CFStringGetLength(the_string: id) -> isize;
    pub fn CFGetTypeID(cf: id) -> usize;
    pub fn CFStringGetTypeID() -> usize;
    pub fn CFBooleanGetTypeID() -> usize;
    pub fn CFBooleanGetValue(boolean: id) -> bool;
    pub fn CFRelease(cf: id);
    pub fn CFArrayGetCount(the_array: id) -> isize;
    pub fn CFArrayGetValueAtIndex(the_array: id, idx: isize) -> id;

    pub fn RegisterEventHotKey(
        inHotKeyCode: u32,
        inHotKeyModifiers: u32,
        inHotKeyID: EventHotKeyID,
        inTarget: EventTargetRef,
        inOptions: u32,
        outRef: *mut EventHotKeyRef,
    ) -> i32;
    pub fn UnregisterEventHotKey(inHotKey: EventHotKeyRef) -> i32;
    pub fn InstallEventHandler(
        inTarget: EventTargetRef,
        inHandler: EventHandlerUPP,
        inNumTypes: u32,
        inList: *const EventTypeSpec,
        inUserData: *mut c_void,
        outRef: *mut EventHandlerRef,
    ) -> i32;
    pub fn RemoveEventHandler(inHandlerRef: EventHandlerRef) -> i32;
    pub fn GetApplicationEventTarget() -> EventTargetRef;
}

/// Copies a `CFStringRef` into an owned `String`.
///
/// # Safety
///
/// `value` must be nil or a valid CoreFoundation object.
pub unsafe fn cf_string_to_string(value: id) -> Option<String> {
    if value.is_null() || CFGetTypeID(value) != CFStringGetTypeID() {
        return None;
    }
    let length = CFStringGetLength(value);
    let buffer_size = (length + 1) * 4;
    let mut buffer = vec![0u8; buffer_size as usize];

    if !CFStringGetCString(
        value,
        buffer.as_mut_ptr() as *mut c_char,
        buffer_size,
        K_UTF8_ENCODING,
    ) {
        return None;
    }
    CStr::from_ptr(buffer.as_ptr() as *const c_char)
        .to_str()
        .ok()
        .map(str::to_string)
}

/// Reads a `CFBooleanRef`; anything else is `false`.
///
/// # Safety
///
/// `value` must be nil or a valid CoreFoundation object.
pub unsafe fn cf_boolean(value: id) -> bool {
    !value.is_null() && CFGetTypeID(value) == CFBooleanGetTypeID() && CFBooleanGetValue(value)
}

/// Copies an `NSString` into an owned `String`.
///
/// # Safety
///
/// `value` must be nil or a valid `NSString`.
pub unsafe fn nsstring_to_string(value: id) -> Option<String> {
    use objc::{msg_send, sel, sel_impl};

    if value.is_null() {
        return None;
    }
    let bytes: *const c_char = msg_send![value, UTF8String];
    if bytes.is_null() {
        return None;
    }
    Some(CStr::from_ptr(bytes).to_string_lossy().into_owned())
}

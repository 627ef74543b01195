use crate::core::error::{Error, Result};
use crate::core::macos_api::{
    cf_boolean, cf_string_to_string, nsstring_to_string, CFArrayGetCount, CFArrayGetValueAtIndex,
    CFRelease, TISCopyCurrentKeyboardInputSource, TISCreateInputSourceList,
    TISGetInputSourceProperty, TISSelectInputSource, K_TIS_PROPERTY_INPUT_SOURCE_ID,
    K_TIS_PROPERTY_INPUT_SOURCE_TYPE, K_TIS_PROPERTY_IS_ENABLED,
    K_TIS_PROPERTY_IS_SELECT_CAPABLE, K_TIS_PROPERTY_LOCALIZED_NAME, NO_ERR,
};
use crate::core::sources::{
    keyboard_sources, InputSource, SourceKind, SourceProperties, TextInputServices,
};

use cocoa::base::{id, nil};
use cocoa::foundation::NSString;
use objc::{class, msg_send, sel, sel_impl};
use tracing::debug;

struct PropertyKeys {
    id: id,
    kind: id,
    name: id,
    selectable: id,
    enabled: id,
}

impl PropertyKeys {
    unsafe fn new() -> Self {
        Self {
            id: NSString::alloc(nil).init_str(K_TIS_PROPERTY_INPUT_SOURCE_ID),
            kind: NSString::alloc(nil).init_str(K_TIS_PROPERTY_INPUT_SOURCE_TYPE),
            name: NSString::alloc(nil).init_str(K_TIS_PROPERTY_LOCALIZED_NAME),
            selectable: NSString::alloc(nil).init_str(K_TIS_PROPERTY_IS_SELECT_CAPABLE),
            enabled: NSString::alloc(nil).init_str(K_TIS_PROPERTY_IS_ENABLED),
        }
    }
}

impl Drop for PropertyKeys {
    fn drop(&mut self) {
        unsafe {
            for key in [self.id, self.kind, self.name, self.selectable, self.enabled] {
                let _: () = msg_send![key, release];
            }
        }
    }
}

/// Input sources and the frontmost application, read through Text Input
/// Source Services and `NSWorkspace`.
///
/// Must be used from the main thread.
pub struct CarbonInputSources {
    keys: PropertyKeys,
}

impl CarbonInputSources {
    pub fn new() -> Self {
        Self {
            keys: unsafe { PropertyKeys::new() },
        }
    }

    /// # Safety
    ///
    /// `source` must be a valid `TISInputSourceRef`.
    unsafe fn properties(&self, source: id) -> Option<SourceProperties> {
        let id = cf_string_to_string(TISGetInputSourceProperty(source, self.keys.id))?;
        let kind = cf_string_to_string(TISGetInputSourceProperty(source, self.keys.kind))?;
        let name = cf_string_to_string(TISGetInputSourceProperty(source, self.keys.name))?;
        let selectable = cf_boolean(TISGetInputSourceProperty(source, self.keys.selectable));
        let enabled = cf_boolean(TISGetInputSourceProperty(source, self.keys.enabled));

        Some(SourceProperties {
            id,
            kind: SourceKind::from_tis_type(&kind),
            name,
            selectable,
            enabled,
        })
    }

    /// Calls `visit` for every enabled source until it returns `Some`.
    fn find_source<T>(
        &self,
        mut visit: impl FnMut(id, SourceProperties) -> Option<T>,
    ) -> Result<Option<T>> {
        unsafe {
            let list = TISCreateInputSourceList(nil, false);
            if list == nil {
                return Err(Error::SourceListUnavailable);
            }

            let mut found = None;
            for i in 0..CFArrayGetCount(list) {
                let source = CFArrayGetValueAtIndex(list, i);
                if source == nil {
                    continue;
                }
                if let Some(properties) = self.properties(source) {
                    found = visit(source, properties);
                    if found.is_some() {
                        break;
                    }
                }
            }

            CFRelease(list);
            Ok(found)
        }
    }
}

impl Default for CarbonInputSources {
    fn default() -> Self {
        Self::new()
    }
}

impl TextInputServices for CarbonInputSources {
    fn input_sources(&self) -> Result<Vec<InputSource>> {
        let mut all = Vec::new();
        self.find_source(|_, properties| {
            all.push(properties);
            None::<()>
        })?;
        Ok(keyboard_sources(all))
    }

    fn current_source_id(&self) -> Result<String> {
        unsafe {
            let source = TISCopyCurrentKeyboardInputSource();
            if source == nil {
                return Err(Error::CurrentSourceUnavailable);
            }
            let source_id = cf_string_to_string(TISGetInputSourceProperty(source, self.keys.id));
            CFRelease(source);
            source_id.ok_or(Error::CurrentSourceUnavailable)
        }
    }

    fn select_source(&self, source_id: &str) -> Result<()> {
        let outcome = self.find_source(|source, properties| {
            if properties.id != source_id {
                return None;
            }
            if !properties.enabled {
                return Some(Err(Error::SourceNotEnabled(source_id.to_string())));
            }
            let status = unsafe { TISSelectInputSource(source) };
            if status != NO_ERR {
                return Some(Err(Error::SelectFailed {
                    id: source_id.to_string(),
                    status,
                }));
            }
            Some(Ok(()))
        })?;

        match outcome {
            Some(result) => {
                if result.is_ok() {
                    debug!("Selected input source {}", source_id);
                }
                result
            }
            None => Err(Error::SourceNotFound(source_id.to_string())),
        }
    }

    fn frontmost_bundle_id(&self) -> Option<String> {
        unsafe {
            let workspace: id = msg_send![class!(NSWorkspace), sharedWorkspace];
            let active_app: id = msg_send![workspace, frontmostApplication];
            if active_app == nil {
                return None;
            }
            let bundle_id: id = msg_send![active_app, bundleIdentifier];
            nsstring_to_string(bundle_id)
        }
    }
}

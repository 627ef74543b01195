/// Something the system told us about, forwarded to the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// An application became frontmost; carries its bundle identifier.
    AppActivated(String),
    AppLaunched,
    AppTerminated,
    /// The set of enabled input sources changed.
    SourcesChanged,
    /// The selected input source changed.
    SelectionChanged,
    /// The quick-switch hotkey was pressed.
    QuickSwitch,
}

/// Debounce groups; notices in one group collapse into the latest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    Activation,
    AppList,
    Sources,
}

impl Notice {
    /// `None` for notices that must be handled immediately.
    pub fn debounce_kind(&self) -> Option<NoticeKind> {
        match self {
            Notice::AppActivated(_) => Some(NoticeKind::Activation),
            Notice::AppLaunched | Notice::AppTerminated => Some(NoticeKind::AppList),
            Notice::SourcesChanged => Some(NoticeKind::Sources),
            Notice::SelectionChanged | Notice::QuickSwitch => None,
        }
    }
}

#[cfg(target_os = "macos")]
pub use self::macos::Observer;

#[cfg(target_os = "macos")]
mod macos {
    use std::sync::{Mutex, OnceLock};

    use cocoa::base::{id, nil};
    use cocoa::foundation::{NSAutoreleasePool, NSString};
    use objc::declare::ClassDecl;
    use objc::runtime::{Class, Object, Sel};
    use objc::{class, msg_send, sel, sel_impl};
    use tracing::{debug, warn};

    use super::Notice;
    use crate::core::macos_api::{
        nsstring_to_string, K_TIS_NOTIFY_ENABLED_SOURCES_CHANGED,
        K_TIS_NOTIFY_SELECTED_SOURCE_CHANGED,
    };

    const OBSERVER_CLASS: &str = "InputBinderObserver";

    type Sink = Box<dyn Fn(Notice) + Send>;

    static SINK: OnceLock<Mutex<Option<Sink>>> = OnceLock::new();

    fn forward(notice: Notice) {
        let Some(sink) = SINK.get() else {
            return;
        };
        match sink.lock() {
            Ok(guard) => {
                if let Some(sink) = guard.as_ref() {
                    sink(notice);
                }
            }
            Err(_) => warn!("Notification sink is poisoned; dropping {:?}", notice),
        }
    }

    fn observer_class() -> &'static Class {
        let Some(mut decl) = ClassDecl::new(OBSERVER_CLASS, class!(NSObject)) else {
            return Class::get(OBSERVER_CLASS).unwrap_or_else(|| class!(NSObject));
        };

        unsafe {
            decl.add_method(
                sel!(appActivated:),
                app_activated as extern "C" fn(&Object, Sel, id),
            );
            decl.add_method(
                sel!(appLaunched:),
                app_launched as extern "C" fn(&Object, Sel, id),
            );
            decl.add_method(
                sel!(appTerminated:),
                app_terminated as extern "C" fn(&Object, Sel, id),
            );
            decl.add_method(
                sel!(sourcesChanged:),
                sources_changed as extern "C" fn(&Object, Sel, id),
            );
            decl.add_method(
                sel!(selectionChanged:),
                selection_changed as extern "C" fn(&Object, Sel, id),
            );
        }

        decl.register()
    }

    extern "C" fn app_activated(_self: &Object, _cmd: Sel, notification: id) {
        let bundle_id = unsafe {
            let pool = NSAutoreleasePool::new(nil);
            let bundle_id = activated_bundle_id(notification);
            let _: () = msg_send![pool, drain];
            bundle_id
        };
        match bundle_id {
            Some(bundle_id) => forward(Notice::AppActivated(bundle_id)),
            None => debug!("Activated application has no bundle identifier"),
        }
    }

    extern "C" fn app_launched(_self: &Object, _cmd: Sel, _notification: id) {
        forward(Notice::AppLaunched);
    }

    extern "C" fn app_terminated(_self: &Object, _cmd: Sel, _notification: id) {
        forward(Notice::AppTerminated);
    }

    extern "C" fn sources_changed(_self: &Object, _cmd: Sel, _notification: id) {
        forward(Notice::SourcesChanged);
    }

    extern "C" fn selection_changed(_self: &Object, _cmd: Sel, _notification: id) {
        forward(Notice::SelectionChanged);
    }

    unsafe fn activated_bundle_id(notification: id) -> Option<String> {
        let user_info: id = msg_send![notification, userInfo];
        if user_info == nil {
            return None;
        }
        let key = NSString::alloc(nil).init_str("NSWorkspaceApplicationKey");
        let app: id = msg_send![user_info, objectForKey: key];
        let _: () = msg_send![key, release];
        if app == nil {
            return None;
        }
        let bundle_id: id = msg_send![app, bundleIdentifier];
        nsstring_to_string(bundle_id)
    }

    unsafe fn add_observer(center: id, observer: id, selector: Sel, name: &str) {
        let name = NSString::alloc(nil).init_str(name);
        let _: () = msg_send![center,
            addObserver: observer
            selector: selector
            name: name
            object: nil
        ];
        let _: () = msg_send![name, release];
    }

    /// Subscription to workspace and input-source notifications. Dropping it
    /// unsubscribes.
    pub struct Observer {
        observer: id,
    }

    impl Observer {
        /// Subscribes to the notifications and forwards each one to `sink`.
        ///
        /// Must be called on the main thread, whose run loop delivers the
        /// notifications. Installing a second observer replaces the sink.
        pub fn install(sink: impl Fn(Notice) + Send + 'static) -> Self {
            let slot = SINK.get_or_init(|| Mutex::new(None));
            if let Ok(mut guard) = slot.lock() {
                *guard = Some(Box::new(sink));
            }

            unsafe {
                let observer: id = msg_send![observer_class(), new];

                let workspace: id = msg_send![class!(NSWorkspace), sharedWorkspace];
                let workspace_center: id = msg_send![workspace, notificationCenter];
                add_observer(
                    workspace_center,
                    observer,
                    sel!(appActivated:),
                    "NSWorkspaceDidActivateApplicationNotification",
                );
                add_observer(
                    workspace_center,
                    observer,
                    sel!(appLaunched:),
                    "NSWorkspaceDidLaunchApplicationNotification",
                );
                add_observer(
                    workspace_center,
                    observer,
                    sel!(appTerminated:),
                    "NSWorkspaceDidTerminateApplicationNotification",
                );

                let distributed_center: id =
                    msg_send![class!(NSDistributedNotificationCenter), defaultCenter];
                add_observer(
                    distributed_center,
                    observer,
                    sel!(sourcesChanged:),
                    K_TIS_NOTIFY_ENABLED_SOURCES_CHANGED,
                );
                add_observer(
                    distributed_center,
                    observer,
                    sel!(selectionChanged:),
                    K_TIS_NOTIFY_SELECTED_SOURCE_CHANGED,
                );

                debug!("Observing workspace and input source notifications");
                Self { observer }
            }
        }
    }

    impl Drop for Observer {
        fn drop(&mut self) {
            unsafe {
                let workspace: id = msg_send![class!(NSWorkspace), sharedWorkspace];
                let workspace_center: id = msg_send![workspace, notificationCenter];
                let _: () = msg_send![workspace_center, removeObserver: self.observer];

                let distributed_center: id =
                    msg_send![class!(NSDistributedNotificationCenter), defaultCenter];
                let _: () = msg_send![distributed_center, removeObserver: self.observer];

                let _: () = msg_send![self.observer, release];
            }
            if let Some(Ok(mut guard)) = SINK.get().map(Mutex::lock) {
                guard.take();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_map_to_debounce_groups() {
        assert_eq!(
            Notice::AppActivated("com.apple.Safari".into()).debounce_kind(),
            Some(NoticeKind::Activation)
        );
        assert_eq!(Notice::AppLaunched.debounce_kind(), Some(NoticeKind::AppList));
        assert_eq!(Notice::AppTerminated.debounce_kind(), Some(NoticeKind::AppList));
        assert_eq!(Notice::SourcesChanged.debounce_kind(), Some(NoticeKind::Sources));
        assert_eq!(Notice::QuickSwitch.debounce_kind(), None);
        assert_eq!(Notice::SelectionChanged.debounce_kind(), None);
    }
}

use std::sync::Mutex;

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{AtomEnum, ConnectionExt, Window};
use x11rb::rust_connection::RustConnection;

use super::ForegroundProbe;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "studyguard::platform";

use crate::log_warn;

/// Reads the focused window's `WM_CLASS` through EWMH `_NET_ACTIVE_WINDOW`.
/// The instance part (lowercased) is the app id; the class part is the
/// display name.
pub struct X11ForegroundProbe {
    conn: Mutex<RustConnection>,
    root: Window,
    active_window_atom: u32,
}

impl X11ForegroundProbe {
    /// `None` when no X server is reachable (Wayland-only sessions, headless).
    pub fn connect() -> Option<Self> {
        let (conn, screen_num) = match x11rb::connect(None) {
            Ok(connection) => connection,
            Err(err) => {
                log_warn!("no X11 display, focus guard unavailable: {err}");
                return None;
            }
        };
        let root = conn.setup().roots.get(screen_num)?.root;
        let active_window_atom = conn
            .intern_atom(false, b"_NET_ACTIVE_WINDOW")
            .ok()?
            .reply()
            .ok()?
            .atom;

        Some(Self {
            conn: Mutex::new(conn),
            root,
            active_window_atom,
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&RustConnection) -> Option<T>) -> Option<T> {
        let guard = match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&guard)
    }

    fn active_window(&self, conn: &RustConnection) -> Option<Window> {
        let reply = conn
            .get_property(false, self.root, self.active_window_atom, AtomEnum::WINDOW, 0, 1)
            .ok()?
            .reply()
            .ok()?;

        let window = reply.value32()?.next()?;
        (window != x11rb::NONE).then_some(window)
    }

    fn wm_class(&self, conn: &RustConnection, window: Window) -> Option<(String, String)> {
        let reply = conn
            .get_property(false, window, AtomEnum::WM_CLASS, AtomEnum::STRING, 0, 1024)
            .ok()?
            .reply()
            .ok()?;
        if reply.value.is_empty() {
            return None;
        }

        let raw = String::from_utf8_lossy(&reply.value);
        let mut parts = raw.split('\0').filter(|part| !part.is_empty());
        let instance = parts.next()?.to_string();
        let class = parts.next().map(str::to_string).unwrap_or_else(|| instance.clone());
        Some((instance, class))
    }

    fn focused_class(&self) -> Option<(String, String)> {
        self.with_conn(|conn| {
            let window = self.active_window(conn)?;
            self.wm_class(conn, window)
        })
    }
}

impl ForegroundProbe for X11ForegroundProbe {
    fn has_introspection_permission(&self) -> bool {
        true
    }

    fn current_foreground_app(&self) -> Option<String> {
        self.focused_class()
            .map(|(instance, _)| instance.to_lowercase())
    }

    fn display_name(&self, app_id: &str) -> Option<String> {
        let (instance, class) = self.focused_class()?;
        instance.eq_ignore_ascii_case(app_id).then_some(class)
    }
}

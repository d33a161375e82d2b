/// Socket path the renderer listens on by default.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/.virgl_test";

/// Identifier used when the process name cannot be determined.
pub const FALLBACK_CLIENT_NAME: &str = "virtest";

/// Shared-memory directory selected by `VTEST_RING=1`.
pub const DEFAULT_SHM_DIR: &str = "/dev/shm";

/// Name of the running program, used to label the connection on the
/// renderer side. Truncated to `max_len` bytes on a character boundary.
pub fn process_name(max_len: usize) -> String {
    let name = read_process_name().unwrap_or_else(|| FALLBACK_CLIENT_NAME.to_string());
    truncate_on_char_boundary(&name, max_len).to_string()
}

fn read_process_name() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(comm) = std::fs::read_to_string("/proc/self/comm") {
            let comm = comm.trim_end();
            if !comm.is_empty() {
                return Some(comm.to_string());
            }
        }
    }
    std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .filter(|n| !n.is_empty())
}

pub fn truncate_on_char_boundary(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

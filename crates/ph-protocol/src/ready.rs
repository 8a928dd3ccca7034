//! Startup line the daemon prints for the process that spawned it

/// First stdout line of a daemon that is ready to serve
pub const READY_LINE: &str = "OK";

/// Second stdout line when another daemon was already serving
pub const ALREADY_RUNNING_LINE: &str = "persistent-https proxy already running";

/// True if `line` (with or without its newline) is exactly the ready token
pub fn is_ready_line(line: &str) -> bool {
    line.strip_suffix('\n').unwrap_or(line) == READY_LINE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_line_exact() {
        assert!(is_ready_line("OK"));
        assert!(is_ready_line("OK\n"));
        assert!(!is_ready_line("OK "));
        assert!(!is_ready_line("ok"));
        assert!(!is_ready_line("error: permission denied"));
        assert!(!is_ready_line(""));
    }
}

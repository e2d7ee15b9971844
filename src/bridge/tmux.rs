//! tmux and ttyd argument construction and output parsing.

/// Lines of scrollback included in a capture.
pub const CAPTURE_SCROLLBACK: i32 = 100;

const PANE_INFO_FORMAT: &str = "#{session_name}\t#{window_index}\t#{window_zoomed_flag}";

/// Strip C0 control characters other than tab, LF and CR.
pub fn sanitize_input(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(*c, '\u{00}'..='\u{08}' | '\u{0b}' | '\u{0c}' | '\u{0e}'..='\u{1f}'))
        .collect()
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

pub fn capture_pane(pane: &str) -> Vec<String> {
    let start = format!("-{CAPTURE_SCROLLBACK}");
    args(["capture-pane", "-t", pane, "-p", "-S", start.as_str()])
}

/// Send `text` literally so words like `Enter` are not taken as key names.
pub fn send_literal(pane: &str, text: &str) -> Vec<String> {
    args(["send-keys", "-t", pane, "-l", "--", text])
}

pub fn send_enter(pane: &str) -> Vec<String> {
    args(["send-keys", "-t", pane, "Enter"])
}

pub fn pane_info(pane: &str) -> Vec<String> {
    args(["display-message", "-p", "-t", pane, PANE_INFO_FORMAT])
}

pub fn zoomed_flag(pane: &str) -> Vec<String> {
    args(["display-message", "-p", "-t", pane, "#{window_zoomed_flag}"])
}

pub fn new_grouped_session(name: &str, original: &str) -> Vec<String> {
    args(["new-session", "-d", "-s", name, "-t", original])
}

pub fn select_window(session: &str, window_index: &str) -> Vec<String> {
    let target = format!("{session}:{window_index}");
    args(["select-window", "-t", target.as_str()])
}

/// Let the most recently active client decide the window size.
pub fn window_size_latest(session: &str) -> Vec<String> {
    args(["set-option", "-t", session, "window-size", "latest"])
}

pub fn toggle_zoom(pane: &str) -> Vec<String> {
    args(["resize-pane", "-Z", "-t", pane])
}

pub fn kill_session(session: &str) -> Vec<String> {
    args(["kill-session", "-t", session])
}

/// Arguments for a writable ttyd attached to `target` on `port`.
pub fn ttyd(port: u16, tmux_program: &str, target: &str) -> Vec<String> {
    let port = port.to_string();
    args(["-p", port.as_str(), "-W", tmux_program, "attach-session", "-t", target])
}

/// Where a pane lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneInfo {
    pub session: String,
    pub window_index: String,
    pub zoomed: bool,
}

pub fn parse_pane_info(output: &str) -> Option<PaneInfo> {
    let line = output.lines().next()?;
    let mut fields = line.split('\t');
    let session = fields.next()?.trim();
    let window_index = fields.next()?.trim();
    let zoomed = fields.next()?.trim();
    if session.is_empty() || window_index.is_empty() {
        return None;
    }
    Some(PaneInfo {
        session: session.to_string(),
        window_index: window_index.to_string(),
        zoomed: parse_flag(zoomed),
    })
}

pub fn parse_flag(output: &str) -> bool {
    output.trim() == "1"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_control_characters() {
        assert_eq!(sanitize_input("a\u{0}b\u{7}c\u{1b}[31m"), "abc[31m");
        assert_eq!(sanitize_input("x\u{0b}y\u{0c}z"), "xyz");
    }

    #[test]
    fn sanitize_keeps_tab_newline_and_carriage_return() {
        assert_eq!(sanitize_input("a\tb\nc\rd"), "a\tb\nc\rd");
        assert_eq!(sanitize_input("日本語 ✓"), "日本語 ✓");
    }

    #[test]
    fn capture_uses_bounded_scrollback() {
        assert_eq!(
            capture_pane("%3"),
            ["capture-pane", "-t", "%3", "-p", "-S", "-100"]
        );
    }

    #[test]
    fn literal_send_ends_option_parsing() {
        assert_eq!(
            send_literal("%0", "-rf"),
            ["send-keys", "-t", "%0", "-l", "--", "-rf"]
        );
    }

    #[test]
    fn parses_pane_info() {
        assert_eq!(
            parse_pane_info("work\t2\t0\n"),
            Some(PaneInfo {
                session: "work".into(),
                window_index: "2".into(),
                zoomed: false,
            })
        );
        assert!(parse_pane_info("main\t0\t1").unwrap().zoomed);
    }

    #[test]
    fn rejects_malformed_pane_info() {
        assert_eq!(parse_pane_info(""), None);
        assert_eq!(parse_pane_info("work\t2"), None);
        assert_eq!(parse_pane_info("\t\t0"), None);
    }

    #[test]
    fn ttyd_attaches_to_target() {
        assert_eq!(
            ttyd(7681, "tmux", "md-open-1234"),
            ["-p", "7681", "-W", "tmux", "attach-session", "-t", "md-open-1234"]
        );
    }
}

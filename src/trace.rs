use std::sync::OnceLock;

/// Phase filter parsed once from `TSUBAME_TRACE`: unset or `0` disables
/// tracing, `1` traces every phase, anything else is a comma-separated
/// list of phases (e.g. `TSUBAME_TRACE=cow,promote,shuffle`).
enum Filter {
    Off,
    All,
    Phases(Vec<String>),
}

static FILTER: OnceLock<Filter> = OnceLock::new();

pub(crate) fn is_enabled(phase: &str) -> bool {
    let filter = FILTER.get_or_init(|| {
        match std::env::var("TSUBAME_TRACE").as_deref() {
            Err(_) | Ok("") | Ok("0") => Filter::Off,
            Ok("1") => Filter::All,
            Ok(list) => Filter::Phases(list.split(',').map(str::to_string).collect()),
        }
    });
    match filter {
        Filter::Off => false,
        Filter::All => true,
        Filter::Phases(phases) => phases.iter().any(|p| p == phase),
    }
}

macro_rules! trace_log {
    ($phase:expr, $($arg:tt)*) => {
        if $crate::trace::is_enabled($phase) {
            eprintln!("[TRACE:{}] {}", $phase, format!($($arg)*));
        }
    };
}
pub(crate) use trace_log;

//! Display macros for user-facing terminal output

/// Print user-facing output with newline.
/// Routes to stdout in CLI mode, stderr in JSON mode
#[macro_export]
macro_rules! display_println {
    () => {
        $crate::display_println!("")
    };
    ($($arg:tt)*) => {{
        use $crate::output::{current_mode, writer::writeln_output};
        let _ = writeln_output(current_mode(), format_args!($($arg)*));
    }};
}

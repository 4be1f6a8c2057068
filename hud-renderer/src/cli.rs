//! Command-line handling.

/// Runtime options, resolved from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Framebuffer device (or plain file with `--fb-file`).
    pub fb_path: String,
    /// Shared widget-table file.
    pub shm_path: String,
    /// Virtual terminal to take ownership of, if any.
    pub vt: Option<i32>,
    /// Mirror the output vertically (panel mounted upside down).
    pub flip: bool,
    /// Render into a preview window instead of a framebuffer.
    pub simulator: bool,
    /// Treat `fb_path` as a plain file instead of a framebuffer device.
    pub fb_file: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            fb_path: "/dev/fb0".to_owned(),
            shm_path: "/dev/shm/hud".to_owned(),
            vt: None,
            flip: false,
            simulator: false,
            fb_file: false,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParsedArgs {
    Run(Options),
    Help,
}

/// Parse the argument list (without the program name).
pub fn parse_args(args: &[String]) -> Result<ParsedArgs, String> {
    let mut opts = Options::default();
    let mut it = args.iter();

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(ParsedArgs::Help),
            "-d" => opts.fb_path = take_value(&mut it, "-d")?,
            "-s" => opts.shm_path = take_value(&mut it, "-s")?,
            "-v" => {
                let v = take_value(&mut it, "-v")?;
                opts.vt = Some(v.parse().map_err(|_| format!("invalid VT number: {v}"))?);
            }
            "-f" | "--flip" => opts.flip = true,
            "-S" | "--simulator" => opts.simulator = true,
            "--fb-file" => opts.fb_file = true,
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    if opts.simulator && (opts.fb_file || opts.vt.is_some()) {
        return Err("simulator mode takes neither --fb-file nor -v".to_owned());
    }
    Ok(ParsedArgs::Run(opts))
}

fn take_value(it: &mut core::slice::Iter<'_, String>, flag: &str) -> Result<String, String> {
    it.next()
        .cloned()
        .ok_or_else(|| format!("{flag} requires a value"))
}

pub fn print_help() {
    println!(
        r#"hud-renderer {} - framebuffer renderer for the shared-memory vehicle HUD

USAGE:
    hud-renderer [OPTIONS]

OPTIONS:
    -h, --help        Print this help message
    -d <PATH>         Framebuffer device [default: /dev/fb0]
    -s <PATH>         Shared widget-table file [default: /dev/shm/hud]
    -v <VT>           Take ownership of virtual terminal <VT> and release
                      the display on VT switches
    -f, --flip        Mirror the output vertically
    -S, --simulator   Render into a desktop preview window (requires the
                      `simulator` build feature)
    --fb-file         Treat -d <PATH> as a plain file: an 800x480 RGB
                      framebuffer is created there for headless testing

EXAMPLES:
    hud-renderer                      Drive /dev/fb0 directly
    hud-renderer -v 2 -f              Own VT 2, panel mounted upside down
    hud-renderer --fb-file -d /tmp/fb Headless run into a plain file
"#,
        env!("CARGO_PKG_VERSION")
    );
}

// =============================================================================
// Unit Tests
// =============================================================================

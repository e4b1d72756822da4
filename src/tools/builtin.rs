//! Built-in tools shipped with the server.
//!
//! `get_time`, `read_file`, `write_file`, `list_directory`, `calculate`,
//! `system_info` and `echo`. File tools go through a [`PathGuard`].

use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use sysinfo::{Disk, Disks, System};

use super::calculator::{self, CalcError};
use super::paths::PathGuard;
use super::{string_arg, Arguments, ToolCallResult, ToolRegistry};

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Builds a registry holding every built-in tool.
#[must_use]
pub fn builtin_registry(guard: PathGuard) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry, guard);
    registry
}

/// Registers the built-in tools, in listing order.
pub fn register_builtin_tools(registry: &mut ToolRegistry, guard: PathGuard) {
    let guard = Arc::new(guard);

    registry.register(
        "get_time",
        "Get current date and time",
        json!({
            "type": "object",
            "properties": {},
            "required": []
        }),
        |_| Ok(get_time()),
    );

    let read_guard = Arc::clone(&guard);
    registry.register(
        "read_file",
        "Read contents of a file",
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to read"
                }
            },
            "required": ["file_path"]
        }),
        move |args| Ok(read_file(&read_guard, args)),
    );

    let write_guard = Arc::clone(&guard);
    registry.register(
        "write_file",
        "Write content to a file",
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["file_path", "content"]
        }),
        move |args| Ok(write_file(&write_guard, args)),
    );

    let list_guard = guard;
    registry.register(
        "list_directory",
        "List contents of a directory",
        json!({
            "type": "object",
            "properties": {
                "directory_path": {
                    "type": "string",
                    "description": "Path to the directory to list (defaults to the current directory)"
                }
            },
            "required": []
        }),
        move |args| Ok(list_directory(&list_guard, args)),
    );

    registry.register(
        "calculate",
        "Perform basic mathematical calculations",
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Mathematical expression to evaluate (e.g., '2 + 3 * 4')"
                }
            },
            "required": ["expression"]
        }),
        |args| Ok(calculate(args)),
    );

    registry.register(
        "system_info",
        "Get system information including OS, CPU, memory and disk usage",
        json!({
            "type": "object",
            "properties": {
                "detail_level": {
                    "type": "string",
                    "description": "Level of detail: 'basic' or 'detailed'",
                    "enum": ["basic", "detailed"],
                    "default": "basic"
                }
            },
            "required": []
        }),
        |args| Ok(system_info(args)),
    );

    registry.register(
        "echo",
        "Echo back the input message",
        json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message to echo back"
                }
            },
            "required": ["message"]
        }),
        |args| Ok(echo(args)),
    );
}

fn get_time() -> ToolCallResult {
    let now = chrono::Local::now();
    ToolCallResult::text(format!(
        "Current date and time: {}",
        now.format("%Y-%m-%d %H:%M:%S")
    ))
}

fn read_file(guard: &PathGuard, args: &Arguments) -> ToolCallResult {
    let Some(file_path) = string_arg(args, "file_path") else {
        return ToolCallResult::error("Error: missing required argument 'file_path'");
    };
    let path = match guard.validate(file_path) {
        Ok(p) => p,
        Err(e) => return ToolCallResult::error(format!("Error: {e}")),
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => ToolCallResult::text(format!("File contents of {file_path}:\n\n{content}")),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            ToolCallResult::error(format!("Error: File not found: {file_path}"))
        }
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            ToolCallResult::error(format!("Error: {file_path} is not valid UTF-8 text"))
        }
        Err(e) => ToolCallResult::error(format!("Error reading file: {}", e.kind())),
    }
}

fn write_file(guard: &PathGuard, args: &Arguments) -> ToolCallResult {
    let Some(file_path) = string_arg(args, "file_path") else {
        return ToolCallResult::error("Error: missing required argument 'file_path'");
    };
    let Some(content) = args.get("content").and_then(|v| v.as_str()) else {
        return ToolCallResult::error("Error: missing required argument 'content'");
    };
    let path = match guard.validate(file_path) {
        Ok(p) => p,
        Err(e) => return ToolCallResult::error(format!("Error: {e}")),
    };

    match std::fs::write(&path, content) {
        Ok(()) => {
            tracing::info!(bytes = content.len(), "File written by write_file tool");
            ToolCallResult::text(format!("Successfully wrote content to {file_path}"))
        }
        Err(e) => ToolCallResult::error(format!("Error writing file: {}", e.kind())),
    }
}

fn list_directory(guard: &PathGuard, args: &Arguments) -> ToolCallResult {
    let directory = string_arg(args, "directory_path")
        .or_else(|| string_arg(args, "path"))
        .unwrap_or(".");
    let path = match guard.validate(directory) {
        Ok(p) => p,
        Err(e) => return ToolCallResult::error(format!("Error: {e}")),
    };

    match describe_directory(&path) {
        Ok(listing) => ToolCallResult::text(format!("Contents of directory {directory}:\n\n{listing}")),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            ToolCallResult::error(format!("Error: Directory not found: {directory}"))
        }
        Err(e) => ToolCallResult::error(format!("Error listing directory: {}", e.kind())),
    }
}

/// Sorted listing of a directory, one entry per line, directories suffixed
/// with `/`.
///
/// # Errors
///
/// Returns the underlying I/O error if the directory cannot be read.
pub fn describe_directory(path: &std::path::Path) -> std::io::Result<String> {
    let mut entries: Vec<(String, bool)> = std::fs::read_dir(path)?
        .filter_map(Result::ok)
        .map(|entry| {
            let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
            (entry.file_name().to_string_lossy().into_owned(), is_dir)
        })
        .collect();
    entries.sort();

    let mut listing = String::new();
    for (name, is_dir) in entries {
        if is_dir {
            let _ = writeln!(listing, "[dir]  {name}/");
        } else {
            let _ = writeln!(listing, "[file] {name}");
        }
    }
    Ok(listing)
}

fn calculate(args: &Arguments) -> ToolCallResult {
    let Some(expression) = string_arg(args, "expression") else {
        return ToolCallResult::error("Error: missing required argument 'expression'");
    };

    match calculator::evaluate(expression) {
        Ok(value) => ToolCallResult::text(format!(
            "Result: {expression} = {}",
            calculator::format_number(value)
        )),
        Err(CalcError::DisallowedCharacter(_)) => ToolCallResult::error(
            "Error: Only basic mathematical operations are allowed (+, -, *, /, parentheses)",
        ),
        Err(e) => ToolCallResult::error(format!("Error calculating expression: {e}")),
    }
}

fn system_info(args: &Arguments) -> ToolCallResult {
    let detailed = match string_arg(args, "detail_level") {
        None | Some("basic") => false,
        Some("detailed") => true,
        Some(other) => {
            return ToolCallResult::error(format!(
                "Error: detail_level must be 'basic' or 'detailed', got '{other}'"
            ))
        }
    };

    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_cpu_all();

    let unknown = || "unknown".to_string();
    #[allow(clippy::cast_precision_loss)] // memory sizes are displayed rounded
    let gib = |bytes: u64| bytes as f64 / BYTES_PER_GIB;

    let mut lines = vec![
        format!(
            "System: {} {}",
            System::name().unwrap_or_else(unknown),
            System::os_version().unwrap_or_else(unknown)
        ),
        format!(
            "Kernel: {}",
            System::kernel_version().unwrap_or_else(unknown)
        ),
        format!("Architecture: {}", std::env::consts::ARCH),
        format!(
            "Hostname: {}",
            System::host_name().unwrap_or_else(unknown)
        ),
        format!(
            "Processor: {}",
            sys.cpus()
                .first()
                .map_or_else(unknown, |cpu| cpu.brand().trim().to_string())
        ),
        format!("CPU Cores: {}", sys.cpus().len()),
        format!("Memory: {:.2} GB", gib(sys.total_memory())),
    ];

    if detailed {
        let total = sys.total_memory();
        #[allow(clippy::cast_precision_loss)]
        let used_percent = if total > 0 {
            sys.used_memory() as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        lines.push(format!("Memory Used: {used_percent:.1}%"));
        lines.push(format!("Memory Available: {:.2} GB", gib(sys.available_memory())));

        // Usage is a delta between two samples
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        sys.refresh_cpu_usage();
        lines.push(format!("CPU Usage: {:.1}%", sys.global_cpu_usage()));

        let disks = Disks::new_with_refreshed_list();
        match root_disk(&disks) {
            Some(disk) => {
                let total = disk.total_space();
                let free = disk.available_space();
                #[allow(clippy::cast_precision_loss)]
                let used_percent = if total > 0 {
                    total.saturating_sub(free) as f64 / total as f64 * 100.0
                } else {
                    0.0
                };
                lines.push(format!(
                    "Disk ({}): {:.2} GB total, {:.2} GB free, {used_percent:.1}% used",
                    disk.mount_point().display(),
                    gib(total),
                    gib(free)
                ));
            }
            None => lines.push("Disk: unavailable".to_string()),
        }

        lines.push(format!("Uptime: {} s", System::uptime()));
        lines.push(format!("Boot Time: {}", System::boot_time()));
    }

    ToolCallResult::text(lines.join("\n"))
}

/// The disk mounted at the filesystem root, falling back to the first listed.
fn root_disk(disks: &Disks) -> Option<&Disk> {
    let root = if cfg!(windows) { Path::new("C:\\") } else { Path::new("/") };
    disks
        .list()
        .iter()
        .find(|disk| disk.mount_point() == root)
        .or_else(|| disks.list().first())
}

fn echo(args: &Arguments) -> ToolCallResult {
    match args.get("message").and_then(|v| v.as_str()) {
        Some(message) => ToolCallResult::text(message),
        None => ToolCallResult::error("Error: missing required argument 'message'"),
    }
}

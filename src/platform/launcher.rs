//! Launcher scripts placed in the binary directory

use std::path::Path;

/// One entry point of the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LauncherSpec {
    pub name: &'static str,
    /// Started without a console window on Windows
    pub gui: bool,
}

const fn gui(name: &'static str) -> LauncherSpec {
    LauncherSpec { name, gui: true }
}

const fn console(name: &'static str) -> LauncherSpec {
    LauncherSpec { name, gui: false }
}

pub const LAUNCHERS: &[LauncherSpec] = &[
    gui("app7"),
    console("app7_api"),
    gui("app7_browser"),
    gui("app7_compare"),
    gui("app7_configure"),
    gui("app7_diff"),
    console("app7_doc"),
    gui("app7_editor"),
    gui("app7_hexeditor"),
    gui("app7_iconeditor"),
    gui("app7_plugininstall"),
    gui("app7_pluginrepository"),
    gui("app7_pluginuninstall"),
    gui("app7_qregularexpression"),
    gui("app7_re"),
    gui("app7_shell"),
    gui("app7_snap"),
    gui("app7_sqlbrowser"),
    gui("app7_tray"),
    gui("app7_trpreviewer"),
    gui("app7_uipreviewer"),
    gui("app7_unittest"),
];

/// POSIX shell launcher
pub fn unix_script(interpreter: &Path, app_dir: &Path, name: &str) -> String {
    format!(
        "#!/bin/sh\n\nexec \"{}\" \"{}/{}.py\" \"$@\"\n",
        interpreter.display(),
        app_dir.display(),
        name
    )
}

/// Windows batch launcher. GUI entry points use the windowless interpreter
/// next to `interpreter` and return immediately.
pub fn windows_script(interpreter: &Path, app_dir: &Path, name: &str, gui: bool) -> String {
    if gui {
        let pythonw = interpreter.with_file_name("pythonw.exe");
        format!(
            "@echo off\r\nstart \"\" \"{}\" \"{}\\{}.pyw\" %*\r\n",
            pythonw.display(),
            app_dir.display(),
            name
        )
    } else {
        format!(
            "@\"{}\" \"{}\\{}.py\" %*\r\n",
            interpreter.display(),
            app_dir.display(),
            name
        )
    }
}

use std::fs;
use std::io;
use std::path::Path;

/// Control script for the monitored service. Its output goes to `fetch.log`.
pub const CONTROL_SCRIPT: &str = r#"#!/bin/bash

start_s1go() {
	./s1go --interval=1800 --username=$S1GOUSERNAME \
			--password=$S1GOPASSWORD >> fetch.log 2>&1 &
}

kill_s1go() {
	pkill "^s1go\$" || true
}

build_s1go() {
	go get -u -v -t github.com/smy20011/s1go
	go build github.com/smy20011/s1go
}

case "$1" in
	start)   start_s1go ;;
	stop)    kill_s1go ;;
	restart) kill_s1go; start_s1go ;;
	deploy)  build_s1go; kill_s1go; start_s1go ;;
	*) exit 1
esac
"#;

/// Command lines that drive the control script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlCommands {
    pub start: String,
    pub stop: String,
    pub restart: String,
    pub deploy: String,
}

impl ControlCommands {
    pub fn for_script(path: &Path) -> Self {
        let script = path.display();
        Self {
            start: format!("{script} start"),
            stop: format!("{script} stop"),
            restart: format!("{script} restart"),
            deploy: format!("{script} deploy"),
        }
    }
}

/// Write the control script to `path` and make it executable.
pub fn write_control_script(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, CONTROL_SCRIPT)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

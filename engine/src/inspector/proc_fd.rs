use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Regular files a process holds open, in descriptor order.
///
/// Sockets, pipes and anonymous inodes resolve to non-absolute targets such
/// as `socket:[1234]` and are dropped together with device nodes and deleted
/// files.
pub(crate) fn open_regular_files(pid: u32) -> io::Result<Vec<PathBuf>> {
    open_regular_files_in(&Path::new("/proc").join(pid.to_string()).join("fd"))
}

/// Threads of a process, counted from `/proc/<pid>/task`.
pub(crate) fn thread_count(pid: u32) -> io::Result<usize> {
    let task_dir = Path::new("/proc").join(pid.to_string()).join("task");
    Ok(fs::read_dir(task_dir)?.count())
}

pub(crate) fn open_regular_files_in(fd_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut descriptors: Vec<(u64, PathBuf)> = Vec::new();
    for entry in fs::read_dir(fd_dir)? {
        let entry = entry?;
        let fd = entry
            .file_name()
            .to_string_lossy()
            .parse::<u64>()
            .unwrap_or(u64::MAX);
        descriptors.push((fd, entry.path()));
    }
    descriptors.sort_by_key(|(fd, _)| *fd);

    let mut files: Vec<PathBuf> = Vec::new();
    for (_, link) in descriptors {
        // The descriptor may close between listing and reading.
        let target = match fs::read_link(&link) {
            Ok(target) => target,
            Err(_) => continue,
        };
        if target.is_absolute() && target.is_file() && !files.contains(&target) {
            files.push(target);
        }
    }
    Ok(files)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn keeps_regular_files_in_descriptor_order() {
        let dir = tempfile::tempdir().unwrap();
        let fd_dir = dir.path().join("fd");
        fs::create_dir(&fd_dir).unwrap();

        let script = dir.path().join("payload.py");
        let log = dir.path().join("out.log");
        fs::write(&script, "print(1)\n").unwrap();
        fs::write(&log, "").unwrap();

        symlink("/dev/null", fd_dir.join("0")).unwrap();
        symlink(&log, fd_dir.join("10")).unwrap();
        symlink(&script, fd_dir.join("3")).unwrap();
        symlink("socket:[4242]", fd_dir.join("4")).unwrap();
        symlink(&script, fd_dir.join("5")).unwrap();

        let files = open_regular_files_in(&fd_dir).unwrap();
        assert_eq!(files, vec![script, log]);
    }

    #[test]
    fn missing_fd_table_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open_regular_files_in(&dir.path().join("absent")).is_err());
    }
}

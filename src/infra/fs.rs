//! 文件系统辅助函数

use std::fs;
use std::io;
use std::path::Path;

/// 删除目录或文件，不存在时视为成功
pub fn remove_path(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// 递归复制目录内容到 `dest`（`dest` 不存在时创建）
pub fn copy_dir_all(src: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = dest.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else if file_type.is_symlink() {
            // 链接目标按原样复制内容
            let resolved = fs::canonicalize(entry.path())?;
            if resolved.is_dir() {
                copy_dir_all(&resolved, &target)?;
            } else {
                fs::copy(&resolved, &target)?;
            }
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// 用 `src` 的内容整体替换 `target`
pub fn replace_dir(target: &Path, src: &Path) -> io::Result<()> {
    remove_path(target)?;
    copy_dir_all(src, target)
}

//! Selects source files and compiles each one to its own output file.
use crate::{
    compile::CompileConf,
    compile_to,
    error::{JackError, JackResult},
};

use log::{info, warn};
use std::{
    fs,
    io::{self, BufWriter},
    path::{Path, PathBuf},
};

/// File extension of Jack source files.
pub const SOURCE_EXTENSION: &str = "jack";

#[derive(Debug, Clone)]
pub struct DriverConf {
    /// Continue with the remaining files when one fails.
    pub keep_going: bool,
    /// Extension that replaces `.jack` on output files.
    pub output_extension: String,
    pub compile: CompileConf,
}

impl Default for DriverConf {
    fn default() -> Self {
        Self {
            keep_going: false,
            output_extension: "vm".to_string(),
            compile: CompileConf::default(),
        }
    }
}

#[inline]
pub fn is_source(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == SOURCE_EXTENSION)
}

/// Source files to compile for the given path.
///
/// A directory yields every `.jack` file directly inside it, sorted
/// by name. A file yields itself, if it's a `.jack` file.
pub fn collect_sources(path: &Path) -> JackResult<Vec<PathBuf>> {
    let in_path = |err: io::Error| JackError::from(err).in_file(path);
    let metadata = fs::metadata(path).map_err(in_path)?;

    if metadata.is_dir() {
        let mut sources = vec![];
        for entry in fs::read_dir(path).map_err(in_path)? {
            let entry_path = entry.map_err(in_path)?.path();
            if entry_path.is_file() && is_source(&entry_path) {
                sources.push(entry_path);
            }
        }
        sources.sort();
        Ok(sources)
    } else if is_source(path) {
        Ok(vec![path.to_path_buf()])
    } else {
        Ok(vec![])
    }
}

/// Output file for a source file, with the same base name.
#[inline]
pub fn output_path(source: &Path, extension: &str) -> PathBuf {
    source.with_extension(extension)
}

/// Compile one source file into the given output file.
///
/// A partially written output file is removed when compilation fails.
pub fn compile_file(source: &Path, output: &Path, conf: &CompileConf) -> JackResult<()> {
    let file_bytes = fs::read(source).map_err(|err| JackError::from(err).in_file(source))?;
    let source_code =
        String::from_utf8(file_bytes).map_err(|err| JackError::from(err).in_file(source))?;

    let outfile = fs::File::create(output).map_err(|err| JackError::from(err).in_file(output))?;

    // The writer, and with it the file handle, is dropped before
    // this returns on every path.
    match compile_to(&source_code, BufWriter::new(outfile), conf.clone()) {
        Ok(_) => Ok(()),
        Err(err) => {
            if let Err(remove_err) = fs::remove_file(output) {
                warn!(
                    "failed to remove partial output {}: {remove_err}",
                    output.display()
                );
            }
            Err(err.in_file(source))
        }
    }
}

/// Compile a single source file, or every source file in a directory.
///
/// Returns the paths of the written output files.
pub fn compile_path(path: &Path, conf: &DriverConf) -> JackResult<Vec<PathBuf>> {
    let sources = collect_sources(path)?;
    if sources.is_empty() {
        warn!("no .{SOURCE_EXTENSION} files found at {}", path.display());
    }

    let mut outputs = vec![];
    let mut failed = 0;

    for source in &sources {
        let output = output_path(source, &conf.output_extension);
        info!("compiling {} -> {}", source.display(), output.display());

        match compile_file(source, &output, &conf.compile) {
            Ok(()) => outputs.push(output),
            Err(err) if conf.keep_going => {
                warn!("skipping: {err}");
                failed += 1;
            }
            Err(err) => return Err(err),
        }
    }

    if failed > 0 {
        return Err(JackError::Batch {
            failed,
            total: sources.len(),
        });
    }

    Ok(outputs)
}

#[cfg(test)]
mod test {
    use super::*;

    const GOOD: &str = "class Main { function void main() { return; } }";
    const BAD: &str = "class Broken { function void main() { let x = 1; return; } }";

    /// Fresh scratch directory, unique per test.
    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "jack_compiler_{}_{name}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_output_path() {
        assert_eq!(
            output_path(Path::new("games/Pong/Ball.jack"), "vm"),
            PathBuf::from("games/Pong/Ball.vm")
        );
    }

    #[test]
    fn test_collect_sources_filters_and_sorts() {
        let dir = scratch_dir("collect");
        fs::write(dir.join("Zeta.jack"), GOOD).unwrap();
        fs::write(dir.join("Alpha.jack"), GOOD).unwrap();
        fs::write(dir.join("README.txt"), "not a source").unwrap();
        fs::write(dir.join("Alpha.vm"), "").unwrap();

        let sources = collect_sources(&dir).unwrap();
        assert_eq!(sources, vec![dir.join("Alpha.jack"), dir.join("Zeta.jack")]);

        assert_eq!(
            collect_sources(&dir.join("README.txt")).unwrap(),
            Vec::<PathBuf>::new()
        );

        match collect_sources(&dir.join("Missing.jack")).unwrap_err() {
            JackError::File { path, source } => {
                assert_eq!(path, dir.join("Missing.jack"));
                assert!(matches!(*source, JackError::Io(_)));
            }
            err => panic!("unexpected error {err:?}"),
        }

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_compile_directory() {
        let dir = scratch_dir("compile_dir");
        fs::write(dir.join("Main.jack"), GOOD).unwrap();

        let outputs = compile_path(&dir, &DriverConf::default()).unwrap();
        assert_eq!(outputs, vec![dir.join("Main.vm")]);
        assert_eq!(
            fs::read_to_string(dir.join("Main.vm")).unwrap(),
            "function Main.main 0\npush constant 0\nreturn\n"
        );

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_failure_removes_partial_output() {
        let dir = scratch_dir("partial");
        let source = dir.join("Broken.jack");
        fs::write(&source, BAD).unwrap();

        let err = compile_file(&source, &dir.join("Broken.vm"), &CompileConf::default())
            .unwrap_err();
        assert!(matches!(err, JackError::File { .. }));
        assert!(err.to_string().contains("undeclared variable 'x'"));
        assert!(!dir.join("Broken.vm").exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_keep_going() {
        let dir = scratch_dir("keep_going");
        fs::write(dir.join("Broken.jack"), BAD).unwrap();
        fs::write(dir.join("Main.jack"), GOOD).unwrap();

        // Stops at the first failure by default.
        let err = compile_path(&dir, &DriverConf::default()).unwrap_err();
        assert!(matches!(err, JackError::File { .. }));
        assert!(!dir.join("Main.vm").exists());

        let conf = DriverConf {
            keep_going: true,
            ..DriverConf::default()
        };
        match compile_path(&dir, &conf).unwrap_err() {
            JackError::Batch { failed, total } => {
                assert_eq!(failed, 1);
                assert_eq!(total, 2);
            }
            err => panic!("unexpected error {err:?}"),
        }
        assert!(dir.join("Main.vm").exists());

        fs::remove_dir_all(&dir).unwrap();
    }
}

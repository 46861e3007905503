//! Per-runtime build pipelines.
//!
//! C pipeline:
//! 1. Pick the first `.c` file from the request's sources
//! 2. Write it into an isolated scratch directory
//! 3. Invoke `clang --target=wasm32-wasi` against the WASI sysroot
//! 4. Validate output, compute size + SHA256, return the WASM bytes
//!
//! The scratch directory is released unconditionally when the pipeline
//! returns. Go, Rust, and C++ report `not implemented` at the build
//! stage.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, info};

use culvert_core::{CompilationRequest, Runtime, SourceFile};

/// Locate the clang binary.
///
/// Search order:
/// 1. `$CULVERT_CLANG_PATH` environment variable
/// 2. `clang` on `$PATH`
fn find_clang() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CULVERT_CLANG_PATH") {
        let clang = PathBuf::from(&path);
        if clang.is_file() {
            debug!("found clang at {} (from CULVERT_CLANG_PATH)", clang.display());
            return Ok(clang);
        }
    }

    if let Ok(output) = Command::new("which").arg("clang").output() {
        if output.status.success() {
            let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path.is_empty() {
                debug!("found clang at {path} (system PATH)");
                return Ok(PathBuf::from(path));
            }
        }
    }

    bail!(
        "clang not found.\n\
         \n\
         A clang with wasm32-wasi target support is required to build C\n\
         functions. Install the WASI SDK or set CULVERT_CLANG_PATH to\n\
         point to your clang binary."
    )
}

fn wasi_sysroot() -> String {
    std::env::var("CULVERT_WASI_SYSROOT")
        .unwrap_or_else(|_| "/opt/wasi-sdk/share/wasi-sysroot".to_string())
}

/// Build the request's sources into a WASM module, dispatching by runtime.
pub fn build_wasm(request: &CompilationRequest) -> Result<Vec<u8>> {
    match request.runtime {
        Runtime::C => build_c(request),
        Runtime::Go => bail!("go runtime not implemented yet"),
        Runtime::Rust => bail!("rust runtime not implemented yet"),
        Runtime::Cpp => bail!("cpp runtime not implemented yet"),
        Runtime::Python | Runtime::Javascript => {
            bail!("unsupported runtime: {}", request.runtime.as_str())
        }
    }
}

/// C → WASM via clang with the wasm32-wasi target.
fn build_c(request: &CompilationRequest) -> Result<Vec<u8>> {
    let c_file: &SourceFile = request
        .source_files
        .iter()
        .find(|f| f.path.ends_with(".c"))
        .context("no C source file found for C runtime")?;

    // Isolated scratch directory, removed when this function returns.
    let scratch = tempfile::tempdir().context("failed to create build scratch directory")?;

    let src_path = scratch.path().join(&c_file.path);
    if let Some(parent) = src_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&src_path, &c_file.content)?;

    let out_path = scratch.path().join("output.wasm");
    let clang = find_clang()?;
    let sysroot = wasi_sysroot();

    let mut cmd = Command::new(&clang);
    cmd.arg("--target=wasm32-wasi")
        .arg(format!("--sysroot={sysroot}"))
        .arg(&src_path)
        .arg("-O2")
        .arg("-o")
        .arg(&out_path);

    debug!("running: {cmd:?}");

    let output = cmd
        .output()
        .with_context(|| format!("failed to execute clang at {}", clang.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        bail!(
            "clang compilation failed (exit code: {}).\n\nStderr:\n{}\n\nStdout:\n{}",
            output.status.code().unwrap_or(-1),
            stderr,
            stdout,
        );
    }

    if !out_path.is_file() {
        bail!("clang produced no output at {}", out_path.display());
    }

    let wasm_bytes = fs::read(&out_path)?;
    let sha256 = hex::encode(Sha256::digest(&wasm_bytes));
    info!(
        func_id = %request.func_id,
        size_bytes = wasm_bytes.len(),
        %sha256,
        "compiled wasm artifact"
    );

    Ok(wasm_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(runtime: Runtime, files: Vec<SourceFile>) -> CompilationRequest {
        CompilationRequest {
            func_id: "adder".to_string(),
            user_id: "u1".to_string(),
            runtime,
            source_files: files,
            memory_mb: 256,
            timeout_secs: 30,
            run_immediate: false,
        }
    }

    #[test]
    fn unimplemented_runtimes_fail_at_build() {
        for runtime in [Runtime::Go, Runtime::Rust, Runtime::Cpp] {
            let req = request(
                runtime,
                vec![SourceFile {
                    path: "main.src".to_string(),
                    content: b"x".to_vec(),
                }],
            );
            let err = build_wasm(&req).unwrap_err();
            assert!(err.to_string().contains("not implemented"));
        }
    }

    #[test]
    fn unsupported_runtimes_fail_at_build() {
        let req = request(
            Runtime::Python,
            vec![SourceFile {
                path: "main.py".to_string(),
                content: b"print(1)".to_vec(),
            }],
        );
        let err = build_wasm(&req).unwrap_err();
        assert!(err.to_string().contains("unsupported runtime"));
    }

    #[test]
    fn c_build_requires_a_c_source() {
        let req = request(
            Runtime::C,
            vec![SourceFile {
                path: "readme.md".to_string(),
                content: b"not code".to_vec(),
            }],
        );
        let err = build_wasm(&req).unwrap_err();
        assert!(err.to_string().contains("no C source file"));
    }
}

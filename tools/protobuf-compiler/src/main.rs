use std::{
    collections::HashSet,
    env,
    ffi::OsStr,
    fs::{
        read_dir,
        remove_file,
    },
    io::Write as _,
    path::{
        Path,
        PathBuf,
    },
    process::Command,
};

const OUT_DIR: &str = "../../crates/astria-price-feed-core/src/generated";
const SRC_DIR: &str = "../../proto";

const INCLUDES: &[&str] = &[SRC_DIR];

fn main() {
    let buf = get_buf_from_env();
    let mut cmd = Command::new(buf.clone());

    let buf_img = tempfile::NamedTempFile::new()
        .expect("should be able to create a temp file to hold the buf image file descriptor set");

    let crate_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let src_dir = crate_dir.join(SRC_DIR);
    let out_dir = crate_dir.join(OUT_DIR);

    cmd.arg("build")
        .arg(&src_dir)
        .arg("--output")
        .arg(buf_img.path())
        .arg("--as-file-descriptor-set");

    let buf_output = match cmd.output() {
        Err(e) => {
            panic!(
                "failed creating file descriptor set from protobuf: failed to invoke buf (path: \
                 {buf:?}): {e:?}"
            );
        }
        Ok(output) => output,
    };

    emit_buf_stdout(&buf_output.stdout).expect("able to write to stdout");
    emit_buf_stderr(&buf_output.stderr).expect("able to write to stderr");

    assert!(
        buf_output.status.success(),
        "failed creating file descriptor set from protobuf: `buf` returned non-zero exit code"
    );

    let files = find_protos(src_dir);

    prost_build::Config::new()
        .emit_rerun_if_changed(false)
        // deterministic iteration order, so that encoded vote extensions are canonical
        .btree_map(["."])
        // override prost-types with pbjson-types
        .compile_well_known_types()
        .extern_path(".google.protobuf", "::pbjson_types")
        .file_descriptor_set_path(buf_img.path())
        .skip_protoc_run()
        .out_dir(&out_dir)
        .compile_protos(&files, INCLUDES)
        .expect("should be able to compile protobuf using prost");

    clean_foreign_code(&out_dir);
}

fn emit_buf_stdout(buf: &[u8]) -> std::io::Result<()> {
    if !buf.is_empty() {
        std::io::stdout().lock().write_all(buf)?;
        println!();
    }
    Ok(())
}

fn emit_buf_stderr(buf: &[u8]) -> std::io::Result<()> {
    if !buf.is_empty() {
        std::io::stderr().lock().write_all(buf)?;
        eprintln!();
    }
    Ok(())
}

/// Removes every generated file that is not part of the `price_feed` packages.
fn clean_foreign_code(out_dir: &Path) {
    let foreign_files: HashSet<PathBuf> = read_dir(out_dir)
        .expect("should be able to read target folder for generated files")
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            let name = path
                .file_name()
                .expect("generated file should have a file name")
                .to_string_lossy();
            // mod.rs is maintained by hand
            !name.starts_with("price_feed.") && name != "mod.rs"
        })
        .collect();
    for file in foreign_files {
        let _ = remove_file(file);
    }
}

fn find_protos<P: AsRef<Path>>(dir: P) -> Vec<PathBuf> {
    use walkdir::{
        DirEntry,
        WalkDir,
    };
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && e.path().extension() == Some(OsStr::new("proto")))
        .map(DirEntry::into_path)
        .collect()
}

fn get_buf_from_env() -> PathBuf {
    let os_specific_hint = match env::consts::OS {
        "macos" => "You could try running `brew install buf` or downloading a recent release from https://github.com/bufbuild/buf/releases",
        "linux" => "You can download it from https://github.com/bufbuild/buf/releases; if you are on Arch Linux, install it from the AUR with `rua install buf` or another helper",
        _other =>  "Check if there is a precompiled version for your OS at https://github.com/bufbuild/buf/releases"
    };
    let error_msg = "Could not find `buf` installation and this build crate cannot proceed without
    this knowledge. If `buf` is installed and this crate had trouble finding
    it, you can set the `BUF` environment variable with the specific path to your
    installed `buf` binary.";
    let msg = format!("{error_msg} {os_specific_hint}");

    env::var_os("BUF")
        .map(PathBuf::from)
        .or_else(|| which::which("buf").ok())
        .expect(&msg)
}

//! Integration tests driving the probe-dependent wrapper operations
//! against fake compiler scripts, so no real toolchain is needed.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bcache_sys::{env_defined, get_env, set_env, unset_env, ExePath};
use bcache_wrappers::{compute_fingerprint, find_wrapper};

// The process environment is shared between test threads; every test that
// mutates it takes this lock.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn write_script(path: &Path, content: &str) {
    std::fs::write(path, content).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// A fake rustc that answers the probes the wrapper performs.
fn install_fake_rustc(dir: &Path, sysroot: &Path) -> PathBuf {
    let script = format!(
        r#"#!/bin/sh
banner="rustc 1.75.0 (fake)"
if [ -n "$SOURCE_DATE_EPOCH" ]; then banner="rustc 1.75.0 (leaked $SOURCE_DATE_EPOCH)"; fi
mode=""
prev=""
out=""
for a in "$@"; do
  case "$a" in
    -vV) mode=version;;
    --print=sysroot) mode=sysroot;;
    file-names) if [ "$prev" = "--print" ]; then mode=filenames; fi;;
    --emit=dep-info) mode=depinfo;;
  esac
  if [ "$prev" = "-o" ]; then out="$a"; fi
  prev="$a"
done
case "$mode" in
  version) echo "$banner"; echo "host: x86_64-unknown-linux-gnu";;
  sysroot) echo "{sysroot}";;
  filenames) echo "libfoo.rlib";;
  depinfo)
    printf '%s: src/lib.rs src/util.rs\n# env-dep:MY_KEY=abc\n# env-dep:CARGO_MAKEFLAGS=-j8\n' "$out" > "$out"
    ;;
  *) exit 1;;
esac
exit 0
"#,
        sysroot = sysroot.display()
    );
    let path = dir.join("rustc");
    write_script(&path, &script);
    path
}

fn minimal_rustc_args(out_dir: &Path) -> Vec<String> {
    vec![
        "--crate-name".to_string(),
        "foo".to_string(),
        "--crate-type".to_string(),
        "rlib".to_string(),
        "--emit=link,metadata,dep-info".to_string(),
        "--out-dir".to_string(),
        out_dir.to_string_lossy().into_owned(),
        "src/lib.rs".to_string(),
    ]
}

fn rustc_fixture(dir: &Path) -> (PathBuf, PathBuf) {
    let sysroot = dir.join("sysroot");
    std::fs::create_dir_all(sysroot.join("lib")).unwrap();
    std::fs::write(sysroot.join("lib/libstd.so"), "fake libstd").unwrap();
    let rustc = install_fake_rustc(dir, &sysroot);
    let out_dir = dir.join("target");
    std::fs::create_dir_all(&out_dir).unwrap();
    (rustc, out_dir)
}

#[test]
fn rust_build_files_include_rlib_rmeta_and_dep_info() {
    // The dep-info and probe calls scrub the environment; serialize with
    // the other env-sensitive tests.
    let _lock = ENV_LOCK.lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let (rustc, out_dir) = rustc_fixture(dir.path());

    let exe = ExePath::from_command(&rustc.to_string_lossy());
    let mut wrapper = find_wrapper(&exe, &minimal_rustc_args(&out_dir)).unwrap();
    assert_eq!(wrapper.dialect(), "rust");
    wrapper.resolve_args().unwrap();

    let files = wrapper.get_build_files().unwrap();
    assert!(files.contains_key("libfoo.rlib"));
    assert!(files.contains_key("libfoo.rmeta"));
    assert!(files.contains_key("foo.d"));
    for expected in files.values() {
        assert!(expected.required);
        assert!(expected.path.starts_with(&out_dir));
    }
}

#[test]
fn rust_implicit_inputs_and_env_deps() {
    let _lock = ENV_LOCK.lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let (rustc, out_dir) = rustc_fixture(dir.path());

    set_env("CARGO_PKG_NAME", "foo");
    set_env("CARGO_MAKEFLAGS", "-j8");

    let exe = ExePath::from_command(&rustc.to_string_lossy());
    let mut wrapper = find_wrapper(&exe, &minimal_rustc_args(&out_dir)).unwrap();
    wrapper.resolve_args().unwrap();

    let implicit = wrapper.get_implicit_input_files().unwrap();
    assert_eq!(
        implicit,
        vec![PathBuf::from("src/lib.rs"), PathBuf::from("src/util.rs")],
        "implicit inputs are sorted"
    );

    let env = wrapper.get_relevant_env_vars().unwrap();
    assert_eq!(env.get("MY_KEY").map(String::as_str), Some("abc"));
    assert_eq!(env.get("CARGO_PKG_NAME").map(String::as_str), Some("foo"));
    assert!(
        !env.contains_key("CARGO_MAKEFLAGS"),
        "CARGO_MAKEFLAGS is always excluded"
    );

    unset_env("CARGO_PKG_NAME");
    unset_env("CARGO_MAKEFLAGS");
}

#[test]
fn rust_program_id_ignores_volatile_env_and_restores_it() {
    let _lock = ENV_LOCK.lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let (rustc, out_dir) = rustc_fixture(dir.path());

    let exe = ExePath::from_command(&rustc.to_string_lossy());

    let mut wrapper = find_wrapper(&exe, &minimal_rustc_args(&out_dir)).unwrap();
    wrapper.resolve_args().unwrap();
    unset_env("SOURCE_DATE_EPOCH");
    let id_without = wrapper.get_program_id().unwrap();

    set_env("SOURCE_DATE_EPOCH", "1234567890");
    let mut wrapper = find_wrapper(&exe, &minimal_rustc_args(&out_dir)).unwrap();
    wrapper.resolve_args().unwrap();
    let id_with = wrapper.get_program_id().unwrap();

    assert_eq!(
        id_without, id_with,
        "volatile variables must not reach the probed compiler"
    );
    assert!(
        env_defined("SOURCE_DATE_EPOCH"),
        "scrubbed variables are restored after the probe"
    );
    assert_eq!(get_env("SOURCE_DATE_EPOCH"), "1234567890");
    unset_env("SOURCE_DATE_EPOCH");
}

#[test]
fn rust_program_id_depends_on_sysroot_libraries() {
    let _lock = ENV_LOCK.lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let (rustc, out_dir) = rustc_fixture(dir.path());

    let exe = ExePath::from_command(&rustc.to_string_lossy());
    let mut wrapper = find_wrapper(&exe, &minimal_rustc_args(&out_dir)).unwrap();
    wrapper.resolve_args().unwrap();
    let id_before = wrapper.get_program_id().unwrap();

    // A changed compiler shared library must change the identity.
    std::fs::write(dir.path().join("sysroot/lib/libstd.so"), "patched libstd").unwrap();
    let mut wrapper = find_wrapper(&exe, &minimal_rustc_args(&out_dir)).unwrap();
    wrapper.resolve_args().unwrap();
    let id_after = wrapper.get_program_id().unwrap();

    assert_ne!(id_before, id_after);
}

/// A fake gcc: `--version` banner, `-E` echoes a linemarker plus the
/// source text.
fn install_fake_gcc(dir: &Path) -> PathBuf {
    let script = r##"#!/bin/sh
if [ "$1" = "--version" ]; then echo "fakegcc 1.0.0"; exit 0; fi
pre=0
src=""
for a in "$@"; do
  case "$a" in
    -E) pre=1;;
    *.c) src="$a";;
  esac
done
if [ $pre -eq 1 ]; then
  echo "# 1 \"$src\""
  cat "$src"
  exit 0
fi
exit 1
"##;
    let path = dir.join("gcc");
    write_script(&path, script);
    path
}

#[test]
fn gcc_fingerprint_ignores_output_and_include_paths() {
    let dir = tempfile::tempdir().unwrap();
    let gcc = install_fake_gcc(dir.path());
    let src = dir.path().join("a.c");
    std::fs::write(&src, "int main(void) { return 0; }\n").unwrap();
    let src = src.to_string_lossy().into_owned();

    let exe = ExePath::from_command(&gcc.to_string_lossy());

    let args_a: Vec<String> = ["-O2", "-c", src.as_str(), "-o", "a.o", "-I/first/include"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut wrapper = find_wrapper(&exe, &args_a).unwrap();
    wrapper.resolve_args().unwrap();
    let fp_a = compute_fingerprint(wrapper.as_mut()).unwrap();

    let args_b: Vec<String> = ["-O2", "-c", src.as_str(), "-o", "other/b.o", "-I/second/include"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut wrapper = find_wrapper(&exe, &args_b).unwrap();
    wrapper.resolve_args().unwrap();
    let fp_b = compute_fingerprint(wrapper.as_mut()).unwrap();

    assert_eq!(fp_a, fp_b, "output and include paths are not fingerprinted");
}

#[test]
fn gcc_fingerprint_tracks_source_content() {
    let dir = tempfile::tempdir().unwrap();
    let gcc = install_fake_gcc(dir.path());
    let src = dir.path().join("a.c");
    std::fs::write(&src, "int x = 1;\n").unwrap();
    let src_str = src.to_string_lossy().into_owned();

    let exe = ExePath::from_command(&gcc.to_string_lossy());
    let args: Vec<String> = ["-c", src_str.as_str(), "-o", "a.o"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut wrapper = find_wrapper(&exe, &args).unwrap();
    wrapper.resolve_args().unwrap();
    let fp_before = compute_fingerprint(wrapper.as_mut()).unwrap();

    std::fs::write(&src, "int x = 2;\n").unwrap();
    let mut wrapper = find_wrapper(&exe, &args).unwrap();
    wrapper.resolve_args().unwrap();
    let fp_after = compute_fingerprint(wrapper.as_mut()).unwrap();

    assert_ne!(fp_before, fp_after);
}

#[test]
fn gcc_preprocess_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let gcc = install_fake_gcc(dir.path());
    let src = dir.path().join("a.c");
    std::fs::write(&src, "int main(void) { return 0; }\n").unwrap();
    let src_str = src.to_string_lossy().into_owned();

    let exe = ExePath::from_command(&gcc.to_string_lossy());
    let args: Vec<String> = ["-c", src_str.as_str()]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut wrapper = find_wrapper(&exe, &args).unwrap();
    wrapper.resolve_args().unwrap();
    let first = wrapper.preprocess_source().unwrap();
    let second = wrapper.preprocess_source().unwrap();
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

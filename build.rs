fn main() {
    // Add build-time information (git hash, compiler version) for the cli summary.
    built::write_built_file().expect("Failed to acquire build-time information");

    println!("cargo:rerun-if-changed=build.rs");
}

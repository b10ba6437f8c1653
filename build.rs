//! Build script: compiles the Slint window definition.

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=ui/main.slint");

    if let Err(error) = slint_build::compile("ui/main.slint") {
        eprintln!("Failed to compile Slint UI: {error}");
        std::process::exit(1);
    }
}

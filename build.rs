fn main() {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let baremetal = std::env::var("CARGO_FEATURE_BAREMETAL").is_ok();

    let ld = "linker-i686.ld";

    // Only the kernel binary on a bare-metal target gets the linker script
    if os == "none" && baremetal {
        println!("cargo:rustc-link-arg-bin=tern=-T{}/{}", manifest_dir, ld);
    }

    println!("cargo:rerun-if-changed={}", ld);
}

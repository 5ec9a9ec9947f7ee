// build.rs
// Compiles the built-in GLSL shaders to SPIR-V for the Vulkan backend

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Shaders the Vulkan backend embeds. All of them must compile for `lumen_spirv` to be set.
const SPIRV_SHADERS: &[&str] = &["ui.vert", "ui.frag", "basic.vert", "basic.frag"];

fn main() {
    println!("cargo:rerun-if-changed=resources/shaders");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");
    println!("cargo:rustc-check-cfg=cfg(lumen_spirv)");

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Ok(vulkan_sdk) = env::var("VULKAN_SDK") else {
        println!("cargo:warning=VULKAN_SDK not set, Vulkan built-in shaders are unavailable");
        return;
    };

    let glslc = if cfg!(target_os = "windows") {
        format!("{vulkan_sdk}\\Bin\\glslc.exe")
    } else {
        format!("{vulkan_sdk}/bin/glslc")
    };

    if !Path::new(&glslc).exists() {
        println!("cargo:warning=glslc not found at {glslc}, Vulkan built-in shaders are unavailable");
        return;
    }

    let shader_dir = PathBuf::from("resources/shaders");
    let Some(out_dir) = env::var_os("OUT_DIR").map(PathBuf::from) else {
        return;
    };

    let mut compiled_count = 0;
    for name in SPIRV_SHADERS {
        let source = shader_dir.join(name);
        let output = out_dir.join(format!("{name}.spv"));

        match Command::new(&glslc).arg(&source).arg("-o").arg(&output).status() {
            Ok(status) if status.success() => compiled_count += 1,
            Ok(status) => {
                println!(
                    "cargo:warning=glslc failed for {} with exit code {}",
                    source.display(),
                    status.code().unwrap_or(-1)
                );
            }
            Err(e) => {
                println!("cargo:warning=failed to run glslc for {}: {e}", source.display());
            }
        }
    }

    if compiled_count == SPIRV_SHADERS.len() {
        println!("cargo:rustc-cfg=lumen_spirv");
        eprintln!("info: Successfully compiled {compiled_count} shader(s)");
    }
}

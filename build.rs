// Build script to compile the GLSL shaders to SPIR-V

use std::path::Path;
use std::process::Command;

const SHADERS: &[(&str, &str)] = &[
    ("shaders/shader.vert", "shaders/vert.spv"),
    ("shaders/shader.frag", "shaders/frag.spv"),
];

fn main() {
    println!("cargo:rerun-if-changed=shaders/shader.vert");
    println!("cargo:rerun-if-changed=shaders/shader.frag");

    for (input, output) in SHADERS {
        compile_shader(input, output);
    }
}

fn compile_shader(input: &str, output: &str) {
    let input_path = Path::new(input);
    let output_path = Path::new(output);

    // glslc ships with the Vulkan SDK
    let result = Command::new("glslc")
        .arg(input_path)
        .arg("-o")
        .arg(output_path)
        .status();

    match result {
        Ok(status) if status.success() => {}
        Ok(status) => {
            panic!("Failed to compile {}: exit code {:?}", input, status.code());
        }
        Err(e) => {
            println!("cargo:warning=glslc not found ({}), {} was not compiled", e, input);
            println!("cargo:warning=compile manually: glslc {} -o {}", input, output);
        }
    }
}

fn main() {
    // Rebuild if either the RC or the manifest changes
    println!("cargo:rerun-if-changed=windows/resource.rc");
    println!("cargo:rerun-if-changed=windows/app.manifest");

    // Compile the RC file into a COFF .res and link it into the EXE
    embed_resource::compile("windows/resource.rc", embed_resource::NONE);
}

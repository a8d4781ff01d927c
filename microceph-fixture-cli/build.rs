use vergen::EmitBuilder;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Emit the `VERGEN_CARGO_*` env vars used in the long version string
    EmitBuilder::builder().all_cargo().emit()?;

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_server(false)
        .compile_protos(
            &[
                "proto/handpose.proto",
                "proto/broker.proto",
                "proto/token.proto",
                "proto/presence.proto",
            ],
            &["proto"],
        )?;
    Ok(())
}

use novacore::config::GameConfig;

/// Prints the default server configuration as TOML, ready to be saved and
/// edited.
fn main() {
    let config = serdeconv::to_toml_string(&GameConfig::default())
        .expect("Failed to generate config file");

    println!("{}", config);
}

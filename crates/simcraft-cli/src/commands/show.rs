/// Parse a model and print its normalized form.
pub fn run(path: &str, json: bool) {
    let model = super::load_model(path);
    let rendered = if json {
        serde_json::to_string_pretty(&model).map_err(|err| err.to_string())
    } else {
        model.to_yaml().map_err(|err| err.to_string())
    };
    match rendered {
        Ok(text) => println!("{text}"),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

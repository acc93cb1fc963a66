use simcraft_tests::{all_passed, run_all_checks};

/// Run the invariant check battery over a model file.
pub fn run(path: &str, steps: u64) {
    let model = super::load_model(path);
    let results = run_all_checks(&model, steps);

    println!("Checking {path} over {steps} steps:\n");
    for result in &results {
        let mark = if result.passed { '\u{2705}' } else { '\u{274C}' };
        println!("  {mark} {:<20} {}", result.name, result.details);
    }

    let passed = results.iter().filter(|result| result.passed).count();
    println!("\n{passed}/{} checks passed", results.len());

    if !all_passed(&results) {
        std::process::exit(1);
    }
}

use supervision_runner::run;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("application error: {err}");
            std::process::exit(1);
        }
    }
}

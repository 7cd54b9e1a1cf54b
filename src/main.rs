fn main() {
    if let Err(e) = tasktimer_lib::run() {
        eprintln!("[FATAL] {}", e);
        std::process::exit(1);
    }
}

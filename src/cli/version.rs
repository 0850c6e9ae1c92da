/// Display version information
pub fn execute() {
    println!("narthex {}", env!("CARGO_PKG_VERSION"));
    println!("Operator CLI for the Narthex admission gate");
}

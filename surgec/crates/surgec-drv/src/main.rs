use std::process::exit;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match surgec_drv::Config::parse(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            exit(3);
        }
    };
    let (hir, mut sem) = surgec_drv::demo_program();
    if let Err(e) = surgec_drv::run_pipeline(&hir, &mut sem, &config) {
        eprintln!("error: {:#}", e);
        exit(1);
    }
}

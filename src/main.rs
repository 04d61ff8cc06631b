fn main() {
    if let Err(err) = camera_als_lib::run() {
        log::error!("{err:#}");
        eprintln!("camera-als: {err:#}");
        std::process::exit(1);
    }
}

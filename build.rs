fn main() {
    println!("cargo:rerun-if-changed=sdkconfig.defaults");

    // Only firmware builds need the ESP-IDF environment; host test builds
    // skip it entirely.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}

fn main() {
    filesort_lib::run()
}

fn main() {
    moodsense_lib::run()
}

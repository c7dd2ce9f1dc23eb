// Copyright (c) 2025 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use myqtt_codec::SubTopic;

fn main() {
    let t_sys = SubTopic::new("$SYS/dev/cpu/+").unwrap();
    println!("t_sys: {t_sys:?}");
    assert!(t_sys.matches("$SYS/dev/cpu/01"));
    assert!(!t_sys.matches("$SYS/dev/cpu/01/load"));
}

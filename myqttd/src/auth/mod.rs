// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

pub mod file_auth;
pub mod pwd;

pub use file_auth::FileAuth;
pub use pwd::Password;

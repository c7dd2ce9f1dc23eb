// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use crate::U16Data;

/// `KeepAlive` presents connection keep-alive time in seconds.
pub type KeepAlive = U16Data;
